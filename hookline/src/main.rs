use clap::{Parser, Subcommand};
use correlator::errors::{CorrelatorError, DispatchError};
use correlator::{Correlator, Server};
use std::path::PathBuf;
use std::process::ExitCode;
use url::Url;

mod config;
mod logging;
mod statsd;

#[derive(Parser)]
#[command(version, about = "Correlates outbound automation requests with their webhook callbacks")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, default_value = "hookline.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the callback webhook and the admin endpoints
    Serve,
    /// Send one request to a remote endpoint and print the outcome
    Dispatch {
        endpoint: Url,
        /// JSON request body
        body: String,
        /// Wait for the value delivered to the callback webhook
        #[arg(long)]
        await_callback: bool,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Metrics(#[from] statsd::MetricsError),
    #[error("could not start runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error(transparent)]
    Correlator(#[from] CorrelatorError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    // Outlives the final error event so it is flushed to Sentry.
    let mut sentry = None;

    match run(cli, &mut sentry) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "hookline exited with an error");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, sentry: &mut Option<sentry::ClientInitGuard>) -> Result<(), CliError> {
    let config = config::Config::from_file(&cli.config)?;
    // Sentry must be initialized before the runtime starts its threads.
    *sentry = logging::init(config.common.logging.as_ref());
    statsd::init(config.common.metrics.as_ref())?;
    config.correlator.validate().map_err(CorrelatorError::from)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(execute(cli.command, config.correlator))
}

async fn execute(
    command: CliCommand,
    config: correlator::config::Config,
) -> Result<(), CliError> {
    match command {
        CliCommand::Serve => {
            tracing::info!("Starting correlator");
            correlator::run(config).await?;
        }
        CliCommand::Dispatch {
            endpoint,
            body,
            await_callback: false,
        } => {
            let correlator = Correlator::new(&config)?;
            correlator.dispatcher().dispatch(&endpoint, &body).await?;
            println!("ok");
        }
        CliCommand::Dispatch {
            endpoint,
            body,
            await_callback: true,
        } => {
            let correlator = Correlator::new(&config)?;
            // The callback can only be collected while the webhook is listening.
            let server = Server::bind(&config, correlator.clone()).await?;
            let server_task = tokio::spawn(server.run());

            let result = correlator
                .dispatcher()
                .dispatch_and_await(&endpoint, &body)
                .await;
            server_task.abort();

            match result? {
                Some(value) => println!("{value}"),
                None => eprintln!(
                    "no callback value received within {} retries",
                    config.retrieval.max_retries
                ),
            }
        }
    }
    Ok(())
}
