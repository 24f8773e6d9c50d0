//! HTTP seam between the dispatcher and the wire.
//!
//! [`KubeTransport`] rides on `kube::Client` (kubeconfig, TLS, auth, connection
//! pool); tests script their own [`Transport`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use kubeline_core::{Error, KubeApiError, Result, Status};
use tracing::debug;

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: &'static str,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<&'static str>,
}

impl HttpRequest {
    pub fn new(method: &'static str, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None, content_type: None }
    }

    /// Path plus url-encoded query string.
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let mut qs = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.query {
            qs.append_pair(k, v);
        }
        format!("{}?{}", self.path, qs.finish())
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// One-shot request; non-2xx statuses are returned, not raised.
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse>;

    /// Long-lived request whose body is consumed incrementally.
    async fn stream(&self, req: HttpRequest) -> Result<ByteStream>;
}

#[derive(Clone)]
pub struct KubeTransport {
    client: kube::Client,
}

impl KubeTransport {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    /// Client from the ambient kubeconfig or in-cluster environment.
    pub async fn try_default() -> Result<Self> {
        let client = kube::Client::try_default().await.map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self::new(client))
    }

    fn build(req: &HttpRequest) -> Result<http::Request<Vec<u8>>> {
        let mut builder = http::Request::builder().method(req.method).uri(req.uri());
        if let Some(ct) = req.content_type {
            builder = builder.header(http::header::CONTENT_TYPE, ct);
        }
        builder.body(req.body.clone().unwrap_or_default()).map_err(|e| Error::Transport(e.to_string()))
    }
}

fn status_body(e: &kube::core::ErrorResponse) -> Result<Bytes> {
    let st = Status {
        kind: Some("Status".into()),
        api_version: Some("v1".into()),
        status: e.status.clone(),
        message: e.message.clone(),
        reason: e.reason.clone(),
        code: e.code,
    };
    serde_json::to_vec(&st).map(Bytes::from).map_err(Error::Encode)
}

#[async_trait]
impl Transport for KubeTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        let request = Self::build(&req)?;
        debug!(method = req.method, path = %req.path, "sending request");
        match self.client.request_text(request).await {
            Ok(text) => Ok(HttpResponse { status: 200, body: Bytes::from(text) }),
            Err(kube::Error::Api(e)) => Ok(HttpResponse { status: e.code, body: status_body(&e)? }),
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }

    async fn stream(&self, req: HttpRequest) -> Result<ByteStream> {
        use tokio_util::{compat::FuturesAsyncReadCompatExt, io::ReaderStream};
        let request = Self::build(&req)?;
        debug!(path = %req.path, "opening stream");
        let reader = self.client.request_stream(request).await.map_err(|e| match e {
            kube::Error::Api(e) => Error::Api(KubeApiError::new(e.code, e.reason, e.message)),
            other => Error::Transport(other.to_string()),
        })?;
        let stream = ReaderStream::new(reader.compat()).map_err(|e| Error::Transport(e.to_string()));
        Ok(stream.boxed())
    }
}
