use crate::config::{OutboundConfig, RetryPolicy};
use crate::errors::{CorrelatorError, DispatchError};
use crate::metrics_defs::DISPATCH_DURATION;
use crate::retriever::Retriever;
use crate::store::CorrelationStore;
use crate::webhook::ACTION_ID_FIELD;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use shared::histogram;
use std::time::{Duration, Instant};
use url::Url;
use uuid::Uuid;

/// Status reported by the remote endpoint when the workflow was triggered.
pub const SUCCESS_STATUS: &str = "success";

#[derive(Deserialize)]
struct ResponseEnvelope {
    status: String,
}

/// Sends requests to the remote automation service.
///
/// Fire-and-forget requests only check the synchronous response. Correlated
/// requests carry a fresh correlation id and, once the remote side accepts
/// them, wait for the matching callback value.
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    retriever: Retriever,
}

impl Dispatcher {
    pub fn new(
        store: CorrelationStore,
        outbound: &OutboundConfig,
        policy: RetryPolicy,
    ) -> Result<Self, CorrelatorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(outbound.request_timeout_secs))
            .build()
            .map_err(CorrelatorError::HttpClientError)?;

        Ok(Dispatcher {
            client,
            retriever: Retriever::new(store, policy),
        })
    }

    /// Posts `body` to `endpoint` without waiting for a callback.
    pub async fn dispatch(&self, endpoint: &Url, body: &str) -> Result<(), DispatchError> {
        let body = parse_body(body)?;
        self.execute(endpoint, &body, "dispatch").await
    }

    /// Posts `body` to `endpoint` and waits for the value the remote service
    /// delivers to the webhook.
    ///
    /// Returns `Ok(None)` when the request was accepted but no value arrived
    /// before the retry policy ran out.
    pub async fn dispatch_and_await(
        &self,
        endpoint: &Url,
        body: &str,
    ) -> Result<Option<String>, DispatchError> {
        let mut body = parse_body(body)?;
        let correlation_id = Uuid::new_v4().to_string();

        body.as_object_mut()
            .ok_or(DispatchError::BodyNotObject)?
            .insert(
                ACTION_ID_FIELD.to_string(),
                Value::String(correlation_id.clone()),
            );

        self.execute(endpoint, &body, "correlated").await?;

        tracing::debug!(correlation_id = %correlation_id, "Waiting for callback value");
        let retrieval = self.retriever.retrieve(&correlation_id).await;
        Ok(retrieval.into_value())
    }

    async fn execute(
        &self,
        endpoint: &Url,
        body: &Value,
        kind: &'static str,
    ) -> Result<(), DispatchError> {
        let started = Instant::now();
        let result = self.send(endpoint, body).await;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        histogram!(DISPATCH_DURATION, "kind" => kind, "outcome" => outcome)
            .record(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            tracing::error!(endpoint = %endpoint, error = %e, "Dispatch failed");
        }
        result
    }

    async fn send(&self, endpoint: &Url, body: &Value) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(endpoint.clone())
            .json(body)
            .send()
            .await
            .map_err(|source| DispatchError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DispatchError::UnexpectedStatus(status.as_u16()));
        }

        let envelope = response
            .json::<ResponseEnvelope>()
            .await
            .map_err(|e| DispatchError::InvalidEnvelope(e.to_string()))?;

        if envelope.status != SUCCESS_STATUS {
            return Err(DispatchError::RemoteFailure(envelope.status));
        }

        Ok(())
    }
}

fn parse_body(body: &str) -> Result<Value, DispatchError> {
    serde_json::from_str(body).map_err(DispatchError::MalformedBody)
}
