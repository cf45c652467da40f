use crate::webhook::{ACTION_ID_FIELD, VALUE_FIELD};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

/// Callback the fake remote sends after accepting a correlated request.
#[derive(Clone)]
pub struct Callback {
    pub webhook_url: String,
    pub delay: Duration,
    /// `None` leaves the value field out of the payload
    pub value: Option<&'static str>,
}

/// Stand-in for the remote automation service.
#[derive(Clone)]
pub struct FakeRemote {
    status: StatusCode,
    body: &'static str,
    callback: Option<Callback>,
}

impl FakeRemote {
    pub fn replying(status: StatusCode, body: &'static str) -> Self {
        FakeRemote {
            status,
            body,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }
}

pub struct RemoteHandle {
    pub url: Url,
    received: Arc<Mutex<Vec<Value>>>,
}

impl RemoteHandle {
    /// Bodies of the requests received so far, in arrival order.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }
}

pub async fn start_fake_remote(remote: FakeRemote) -> RemoteHandle {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");
    let port = listener.local_addr().unwrap().port();

    let remote = Arc::new(remote);
    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);
            let remote = remote.clone();
            let received = received_clone.clone();

            tokio::spawn(async move {
                let service =
                    service_fn(move |req| handle(req, remote.clone(), received.clone()));
                if let Err(err) = Builder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await
                {
                    eprintln!("Error serving connection: {:?}", err);
                }
            });
        }
    });

    RemoteHandle {
        url: Url::parse(&format!("http://127.0.0.1:{port}/hooks/catch")).unwrap(),
        received,
    }
}

async fn handle(
    req: Request<Incoming>,
    remote: Arc<FakeRemote>,
    received: Arc<Mutex<Vec<Value>>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let bytes = req
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_else(|_| Bytes::new());
    let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    if let Some(callback) = &remote.callback
        && let Some(id) = body.get(ACTION_ID_FIELD).and_then(Value::as_str)
    {
        deliver(callback.clone(), id.to_string());
    }
    received.lock().unwrap().push(body);

    let mut response = Response::new(Full::new(Bytes::from_static(remote.body.as_bytes())));
    *response.status_mut() = remote.status;
    Ok(response)
}

fn deliver(callback: Callback, id: String) {
    let mut payload = Map::new();
    payload.insert(ACTION_ID_FIELD.to_string(), Value::String(id));
    if let Some(value) = callback.value {
        payload.insert(VALUE_FIELD.to_string(), Value::String(value.to_string()));
    }

    tokio::spawn(async move {
        tokio::time::sleep(callback.delay).await;
        let result = reqwest::Client::new()
            .post(&callback.webhook_url)
            .json(&payload)
            .send()
            .await;
        if let Err(err) = result {
            eprintln!("Failed to deliver callback: {:?}", err);
        }
    });
}
