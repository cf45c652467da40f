use crate::config::ValidationError;
use thiserror::Error;

/// Errors raised while running the webhook and admin listeners.
#[derive(Error, Debug)]
pub enum CorrelatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClientError(#[source] reqwest::Error),
}

/// Errors surfaced to the caller of a dispatch.
///
/// A retrieval that runs out of attempts is not an error: the remote side
/// accepted the request, so the dispatcher reports an absent value instead.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Request body is not valid JSON: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("Request body must be a JSON object to carry a correlation id")]
    BodyNotObject,

    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected error from remote endpoint (error code {0})")]
    UnexpectedStatus(u16),

    #[error("Remote endpoint returned an invalid response envelope: {0}")]
    InvalidEnvelope(String),

    #[error("An error occurred when calling the remote endpoint (status: {0})")]
    RemoteFailure(String),
}

/// Reasons a callback delivery is rejected.
#[derive(Error, Debug, PartialEq)]
pub enum IngestError {
    #[error("Callback body is not valid JSON: {0}")]
    MalformedPayload(String),

    #[error("Callback payload is not a JSON object")]
    NotAnObject,

    #[error("Callback payload is missing the `{0}` field")]
    MissingField(&'static str),

    #[error("Callback field `{0}` must be a string")]
    InvalidField(&'static str),
}
