//! Scripted in-process transport for unit tests.
//!
//! Routes each request through a closure and records it, so tests can
//! assert exact call counts per endpoint and device.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

pub struct FakeTransport {
    responder: Box<Responder>,
    latency: Duration,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(FakeTransport {
            responder: Box::new(responder),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Like `new`, but every call sleeps first so concurrent callers overlap.
    pub fn with_latency<F>(latency: Duration, responder: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(FakeTransport {
            responder: Box::new(responder),
            latency,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request answered 200 `{}`.
    pub fn ok() -> Arc<Self> {
        Self::new(|_| Ok(HttpResponse::new(200, "{}")))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&HttpRequest) -> bool) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| pred(r)).count()
    }

    pub fn count_url(&self, needle: &str) -> usize {
        self.count(|r| r.url.contains(needle))
    }

    /// Requests whose body mentions `needle` (device ids, mode values).
    pub fn count_body(&self, method: HttpMethod, needle: &str) -> usize {
        self.count(|r| {
            r.method == method && r.body.as_deref().map_or(false, |b| b.contains(needle))
        })
    }

    pub fn clear(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.responder)(&request)
    }
}
