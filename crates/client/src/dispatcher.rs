use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use kubeline_core::{Error, KubeApiError, PathParams, ResourceDescriptor, Result, Status, Verb};
use kubeline_registry::resolve_path;
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::transport::{ByteStream, HttpRequest, HttpResponse, Transport};

pub const JSON: &str = "application/json";
pub const STRATEGIC_MERGE_PATCH: &str = "application/strategic-merge-patch+json";
pub const MERGE_PATCH: &str = "application/merge-patch+json";
pub const JSON_PATCH: &str = "application/json-patch+json";

pub type Query = Vec<(&'static str, String)>;

/// Serialized request body and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl RequestBody {
    pub fn json<B: Serialize + ?Sized>(body: &B) -> Result<Self> {
        Self::with_content_type(body, JSON)
    }

    pub fn with_content_type<B: Serialize + ?Sized>(body: &B, content_type: &'static str) -> Result<Self> {
        let bytes = serde_json::to_vec(body).map_err(Error::Encode)?;
        Ok(Self { content_type, bytes })
    }
}

/// Resolves a descriptor + verb into an HTTP call and maps the outcome.
///
/// Every call is bounded by the dispatcher's deadline. Nothing is retried here;
/// callers decide with [`Error::is_retryable`].
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Same transport, different deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self { transport: Arc::clone(&self.transport), timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute<T: DeserializeOwned>(
        &self,
        descriptor: &ResourceDescriptor,
        verb: Verb,
        params: &PathParams,
        query: &[(&'static str, String)],
        body: Option<RequestBody>,
    ) -> Result<T> {
        let bytes = self.execute_raw(descriptor, verb, params, query, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::decode(format!("{} {} response", descriptor.gvk.kind, verb), e))
    }

    pub async fn execute_raw(
        &self,
        descriptor: &ResourceDescriptor,
        verb: Verb,
        params: &PathParams,
        query: &[(&'static str, String)],
        body: Option<RequestBody>,
    ) -> Result<Bytes> {
        let req = build_request(descriptor, verb, params, query, body)?;
        let res = self.round_trip(req, verb.as_str()).await;
        if let Err(e) = &res {
            debug!(gvk = %descriptor.gvk, verb = %verb, error = %e, "request failed");
        }
        res
    }

    /// GET an absolute API path outside any descriptor (discovery documents).
    pub async fn get_path<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let bytes = self.round_trip(HttpRequest::new("GET", path), "discover").await.map_err(|e| {
            debug!(path = %path, error = %e, "discovery request failed");
            e
        })?;
        serde_json::from_slice(&bytes).map_err(|e| Error::decode(format!("{} response", path), e))
    }

    async fn round_trip(&self, req: HttpRequest, label: &'static str) -> Result<Bytes> {
        let t0 = Instant::now();
        counter!("dispatch_requests", 1u64, "verb" => label);
        let res = match tokio::time::timeout(self.timeout, self.transport.send(req)).await {
            Ok(res) => res.and_then(check_status),
            Err(_) => Err(Error::Timeout(self.timeout)),
        };
        histogram!("dispatch_latency_ms", t0.elapsed().as_secs_f64() * 1000.0, "verb" => label);
        if res.is_err() {
            counter!("dispatch_errors", 1u64, "verb" => label);
        }
        res
    }

    /// Open a streaming request; only the connect is bounded by the deadline.
    pub async fn open_stream(
        &self,
        descriptor: &ResourceDescriptor,
        verb: Verb,
        params: &PathParams,
        query: &[(&'static str, String)],
    ) -> Result<ByteStream> {
        let req = build_request(descriptor, verb, params, query, None)?;
        counter!("dispatch_requests", 1u64, "verb" => verb.as_str());
        match tokio::time::timeout(self.timeout, self.transport.stream(req)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => {
                counter!("dispatch_errors", 1u64, "verb" => verb.as_str());
                Err(e)
            }
            Err(_) => {
                counter!("dispatch_errors", 1u64, "verb" => verb.as_str());
                Err(Error::Timeout(self.timeout))
            }
        }
    }
}

fn build_request(
    descriptor: &ResourceDescriptor,
    verb: Verb,
    params: &PathParams,
    query: &[(&'static str, String)],
    body: Option<RequestBody>,
) -> Result<HttpRequest> {
    let path = resolve_path(descriptor, verb, params)?;
    let mut req = HttpRequest::new(verb.method(), path);
    req.query = query.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
    if let Some(body) = body {
        req.content_type = Some(body.content_type);
        req.body = Some(body.bytes);
    }
    Ok(req)
}

/// 2xx bodies pass through; anything else becomes a [`KubeApiError`].
fn check_status(res: HttpResponse) -> Result<Bytes> {
    if res.is_success() {
        return Ok(res.body);
    }
    Err(Error::Api(api_error(res.status, &res.body)))
}

pub(crate) fn api_error(status: u16, body: &[u8]) -> KubeApiError {
    match serde_json::from_slice::<Status>(body) {
        Ok(st) if !st.reason.is_empty() || !st.message.is_empty() => KubeApiError::from_status(&st, status),
        _ => {
            let reason = http::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown")
                .replace(' ', "");
            KubeApiError::new(status, reason, String::from_utf8_lossy(body).trim().to_string())
        }
    }
}
