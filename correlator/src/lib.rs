pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod metrics_defs;
pub mod retriever;
pub mod store;
pub mod webhook;

#[cfg(test)]
mod testutils;

use crate::config::{Config, WebhookConfig};
use crate::dispatcher::Dispatcher;
use crate::errors::CorrelatorError;
use crate::store::CorrelationStore;
use crate::webhook::WebhookService;
use shared::admin_service::{AdminService, Readiness};
use shared::http::serve;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Owns the correlation store and wires it into both the webhook and the
/// dispatcher. Clones share the same store.
#[derive(Clone)]
pub struct Correlator {
    store: CorrelationStore,
    dispatcher: Dispatcher,
    webhook: WebhookConfig,
}

impl Correlator {
    pub fn new(config: &Config) -> Result<Self, CorrelatorError> {
        let store = CorrelationStore::new();
        let dispatcher = Dispatcher::new(store.clone(), &config.outbound, config.retrieval)?;

        Ok(Correlator {
            store,
            dispatcher,
            webhook: config.webhook.clone(),
        })
    }

    pub fn store(&self) -> &CorrelationStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn webhook_service(&self) -> WebhookService {
        WebhookService::new(self.store.clone(), &self.webhook)
    }
}

/// Webhook and admin listeners, bound but not yet serving.
pub struct Server {
    correlator: Correlator,
    webhook_listener: TcpListener,
    admin_listener: TcpListener,
    readiness: Readiness,
}

impl Server {
    pub async fn bind(config: &Config, correlator: Correlator) -> Result<Self, CorrelatorError> {
        let webhook_listener =
            TcpListener::bind(format!("{}:{}", config.listener.host, config.listener.port))
                .await?;
        let admin_listener = TcpListener::bind(format!(
            "{}:{}",
            config.admin_listener.host, config.admin_listener.port
        ))
        .await?;

        Ok(Server {
            correlator,
            webhook_listener,
            admin_listener,
            readiness: Readiness::new(),
        })
    }

    pub fn webhook_addr(&self) -> Result<SocketAddr, CorrelatorError> {
        Ok(self.webhook_listener.local_addr()?)
    }

    pub fn admin_addr(&self) -> Result<SocketAddr, CorrelatorError> {
        Ok(self.admin_listener.local_addr()?)
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    /// Serves both listeners until one of them fails to accept.
    pub async fn run(self) -> Result<(), CorrelatorError> {
        let webhook_addr = self.webhook_addr()?;
        let admin_addr = self.admin_addr()?;

        let webhook_task = serve(self.webhook_listener, self.correlator.webhook_service());
        let admin_task = serve(
            self.admin_listener,
            AdminService::<CorrelatorError>::new(self.readiness.clone()),
        );

        self.readiness.mark_ready();
        tracing::info!(
            webhook = %webhook_addr,
            admin = %admin_addr,
            path = %self.correlator.webhook.path,
            "Correlator listening"
        );

        tokio::try_join!(webhook_task, admin_task)?;
        Ok(())
    }
}

pub async fn run(config: Config) -> Result<(), CorrelatorError> {
    config.validate()?;
    let correlator = Correlator::new(&config)?;
    Server::bind(&config, correlator).await?.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Listener, OutboundConfig, RetryPolicy};
    use crate::errors::DispatchError;
    use crate::testutils::{Callback, FakeRemote, start_fake_remote};
    use hyper::StatusCode;
    use std::time::{Duration, Instant};

    fn test_config(retrieval: RetryPolicy) -> Config {
        Config {
            listener: Listener {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            admin_listener: Listener {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            webhook: WebhookConfig::default(),
            outbound: OutboundConfig::default(),
            retrieval,
        }
    }

    /// Starts the listeners in the background and returns the callback URL.
    async fn start(correlator: &Correlator, config: &Config) -> String {
        let server = Server::bind(config, correlator.clone()).await.unwrap();
        let addr = server.webhook_addr().unwrap();
        tokio::spawn(server.run());
        format!("http://{addr}{}", config.webhook.path)
    }

    #[tokio::test]
    async fn test_fire_and_forget_does_not_mint_an_id() {
        let config = test_config(RetryPolicy::default());
        let correlator = Correlator::new(&config).unwrap();
        let remote =
            start_fake_remote(FakeRemote::replying(StatusCode::OK, r#"{"status":"success"}"#))
                .await;

        correlator
            .dispatcher()
            .dispatch(&remote.url, r#"{"zap": "notify"}"#)
            .await
            .unwrap();

        assert!(remote.received()[0].get(webhook::ACTION_ID_FIELD).is_none());
        assert!(correlator.store().is_empty());
    }

    #[tokio::test]
    async fn test_fire_and_forget_remote_error() {
        let config = test_config(RetryPolicy::default());
        let correlator = Correlator::new(&config).unwrap();
        let remote =
            start_fake_remote(FakeRemote::replying(StatusCode::OK, r#"{"status":"error"}"#)).await;

        let result = correlator.dispatcher().dispatch(&remote.url, "{}").await;

        assert!(matches!(
            result.unwrap_err(),
            DispatchError::RemoteFailure(_)
        ));
    }

    #[tokio::test]
    async fn test_callback_delivered_through_webhook() {
        let config = test_config(RetryPolicy {
            wake_on_delivery: false,
            ..RetryPolicy::default()
        });
        let correlator = Correlator::new(&config).unwrap();
        let webhook_url = start(&correlator, &config).await;
        let remote = start_fake_remote(
            FakeRemote::replying(StatusCode::OK, r#"{"status":"success"}"#).with_callback(
                Callback {
                    webhook_url,
                    delay: Duration::from_millis(500),
                    value: Some("42"),
                },
            ),
        )
        .await;

        let started = Instant::now();
        let value = correlator
            .dispatcher()
            .dispatch_and_await(&remote.url, r#"{"zap": "compute"}"#)
            .await
            .unwrap();

        assert_eq!(value, Some("42".to_string()));
        assert!(started.elapsed() < Duration::from_millis(1500));
        assert!(correlator.store().is_empty());
    }

    #[tokio::test]
    async fn test_callback_wakes_waiting_dispatch() {
        let config = test_config(RetryPolicy::default());
        let correlator = Correlator::new(&config).unwrap();
        let webhook_url = start(&correlator, &config).await;
        let remote = start_fake_remote(
            FakeRemote::replying(StatusCode::OK, r#"{"status":"success"}"#).with_callback(
                Callback {
                    webhook_url,
                    delay: Duration::from_millis(200),
                    value: Some("42"),
                },
            ),
        )
        .await;

        let started = Instant::now();
        let value = correlator
            .dispatcher()
            .dispatch_and_await(&remote.url, "{}")
            .await
            .unwrap();

        assert_eq!(value, Some("42".to_string()));
        assert!(started.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_no_callback_returns_absence() {
        let config = test_config(RetryPolicy::default());
        let correlator = Correlator::new(&config).unwrap();
        let remote =
            start_fake_remote(FakeRemote::replying(StatusCode::OK, r#"{"status":"success"}"#))
                .await;

        let started = Instant::now();
        let value = correlator
            .dispatcher()
            .dispatch_and_await(&remote.url, "{}")
            .await
            .unwrap();

        assert_eq!(value, None);
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert!(correlator.store().is_empty());
    }

    #[tokio::test]
    async fn test_callback_without_value_is_rejected_and_times_out() {
        let config = test_config(RetryPolicy {
            retry_interval_ms: 100,
            ..RetryPolicy::default()
        });
        let correlator = Correlator::new(&config).unwrap();
        let webhook_url = start(&correlator, &config).await;

        // The webhook answers the malformed callback directly
        let response = reqwest::Client::new()
            .post(&webhook_url)
            .body(r#"{"actionId": "abc"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        assert!(correlator.store().is_empty());

        // The dispatching side only sees an absent value
        let remote = start_fake_remote(
            FakeRemote::replying(StatusCode::OK, r#"{"status":"success"}"#).with_callback(
                Callback {
                    webhook_url,
                    delay: Duration::from_millis(50),
                    value: None,
                },
            ),
        )
        .await;
        let value = correlator
            .dispatcher()
            .dispatch_and_await(&remote.url, "{}")
            .await
            .unwrap();

        assert_eq!(value, None);
        assert!(correlator.store().is_empty());
    }

    #[tokio::test]
    async fn test_admin_ready_once_serving() {
        let config = test_config(RetryPolicy::default());
        let correlator = Correlator::new(&config).unwrap();
        let server = Server::bind(&config, correlator).await.unwrap();
        let admin_addr = server.admin_addr().unwrap();
        let readiness = server.readiness();
        assert!(!readiness.is_ready());

        tokio::spawn(server.run());
        let response = reqwest::Client::new()
            .get(format!("http://{admin_addr}/ready"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let config = test_config(RetryPolicy::default());
        assert!(matches!(
            run(config).await.unwrap_err(),
            CorrelatorError::InvalidConfig(_)
        ));
    }
}
