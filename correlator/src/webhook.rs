//! Inbound side of the correlation boundary: the remote service posts the
//! result of a triggered workflow here, tagged with the correlation id the
//! dispatcher embedded in the outbound request.

use crate::config::WebhookConfig;
use crate::errors::{CorrelatorError, IngestError};
use crate::metrics_defs::{CALLBACKS_RECEIVED, CALLBACKS_REJECTED};
use crate::store::CorrelationStore;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{Map, Value};
use shared::counter;
use shared::http::{make_boxed_error_response, make_empty_response};
use std::future::Future;
use std::pin::Pin;

/// Field carrying the correlation id, both in outbound requests and in callbacks.
pub const ACTION_ID_FIELD: &str = "actionId";

/// Field carrying the delivered value in callbacks.
pub const VALUE_FIELD: &str = "value";

#[derive(Clone, Debug, PartialEq)]
pub struct CallbackPayload {
    pub action_id: String,
    pub value: String,
}

impl CallbackPayload {
    pub fn parse(bytes: &[u8]) -> Result<Self, IngestError> {
        let json: Value = serde_json::from_slice(bytes)
            .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;
        let object = json.as_object().ok_or(IngestError::NotAnObject)?;

        Ok(CallbackPayload {
            action_id: string_field(object, ACTION_ID_FIELD)?,
            value: string_field(object, VALUE_FIELD)?,
        })
    }
}

// Numbers and booleans are read as their textual form.
fn string_field(object: &Map<String, Value>, field: &'static str) -> Result<String, IngestError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(IngestError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(_) => Err(IngestError::InvalidField(field)),
    }
}

/// Parses a callback body and stores its value. Nothing is stored on error.
pub fn ingest(store: &CorrelationStore, body: &[u8]) -> Result<CallbackPayload, IngestError> {
    let payload = CallbackPayload::parse(body)?;
    store.put(payload.action_id.clone(), payload.value.clone());
    Ok(payload)
}

fn rejection_reason(err: &IngestError) -> &'static str {
    match err {
        IngestError::MalformedPayload(_) => "malformed",
        IngestError::NotAnObject => "not_an_object",
        IngestError::MissingField(_) => "missing_field",
        IngestError::InvalidField(_) => "invalid_field",
    }
}

pub struct WebhookService {
    store: CorrelationStore,
    path: String,
    max_body_bytes: usize,
}

impl WebhookService {
    pub fn new(store: CorrelationStore, config: &WebhookConfig) -> Self {
        WebhookService {
            store,
            path: config.path.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl Service<Request<Incoming>> for WebhookService {
    type Response = Response<BoxBody<Bytes, CorrelatorError>>;
    type Error = CorrelatorError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let store = self.store.clone();
        let on_path = req.uri().path() == self.path;
        let max_body_bytes = self.max_body_bytes;

        Box::pin(async move {
            if !on_path {
                tracing::debug!(path = %req.uri().path(), "Request outside the callback route");
                return Ok(make_boxed_error_response(StatusCode::NOT_FOUND));
            }
            if req.method() != Method::POST {
                return Ok(make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED));
            }

            let body = match Limited::new(req.into_body(), max_body_bytes).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) if e.is::<LengthLimitError>() => {
                    tracing::warn!(limit = max_body_bytes, "Rejected oversized callback");
                    counter!(CALLBACKS_REJECTED, "reason" => "too_large").increment(1);
                    return Ok(make_boxed_error_response(StatusCode::PAYLOAD_TOO_LARGE));
                }
                Err(e) => return Err(CorrelatorError::RequestBodyError(e.to_string())),
            };

            match ingest(&store, &body) {
                Ok(payload) => {
                    tracing::debug!(correlation_id = %payload.action_id, "Received callback value");
                    counter!(CALLBACKS_RECEIVED).increment(1);
                    Ok(make_empty_response(StatusCode::OK))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Rejected callback");
                    counter!(CALLBACKS_REJECTED, "reason" => rejection_reason(&e)).increment(1);
                    Ok(make_boxed_error_response(StatusCode::BAD_REQUEST))
                }
            }
        })
    }
}
