#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use kubeline_client::{ByteStream, ClientConfig, Error, HttpRequest, HttpResponse, KubeClient, Transport};
use kubeline_core::Result;
use kubeline_registry::Registry;
use serde_json::{json, Value as Json};

/// Scripted transport: answers come off per-kind queues, every request is recorded.
#[derive(Default)]
pub struct FakeTransport {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    responses: VecDeque<Result<HttpResponse>>,
    /// Fixed answers by path, consulted before the queue.
    routes: Vec<(String, HttpResponse)>,
    streams: VecDeque<Result<ByteStream>>,
    requests: Vec<HttpRequest>,
    send_delay: Option<Duration>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = self.inner.lock().expect("fake transport lock");
        f(&mut guard)
    }

    pub fn respond(&self, status: u16, body: Json) {
        self.respond_raw(status, body.to_string());
    }

    pub fn respond_raw(&self, status: u16, body: impl Into<String>) {
        let res = HttpResponse { status, body: Bytes::from(body.into()) };
        self.with(|i| i.responses.push_back(Ok(res)));
    }

    pub fn route(&self, path: &str, status: u16, body: Json) {
        let res = HttpResponse { status, body: Bytes::from(body.to_string()) };
        self.with(|i| i.routes.push((path.to_string(), res)));
    }

    pub fn delay_sends(&self, delay: Duration) {
        self.with(|i| i.send_delay = Some(delay));
    }

    /// A stream that yields `chunks` and then ends.
    pub fn stream_chunks(&self, chunks: Vec<String>) {
        let s = futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed();
        self.with(|i| i.streams.push_back(Ok(s)));
    }

    /// A stream that yields `chunks` and then stays open without data.
    pub fn stream_then_hang(&self, chunks: Vec<String>) {
        let s = futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
            .chain(futures::stream::pending())
            .boxed();
        self.with(|i| i.streams.push_back(Ok(s)));
    }

    pub fn stream(&self, s: ByteStream) {
        self.with(|i| i.streams.push_back(Ok(s)));
    }

    pub fn stream_err(&self, e: Error) {
        self.with(|i| i.streams.push_back(Err(e)));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.with(|i| i.requests.clone())
    }

    pub fn list_requests(&self) -> Vec<HttpRequest> {
        self.requests().into_iter().filter(|r| r.query_value("watch").is_none()).collect()
    }

    pub fn watch_requests(&self) -> Vec<HttpRequest> {
        self.requests().into_iter().filter(|r| r.query_value("watch") == Some("true")).collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        let (next, delay) = self.with(|i| {
            let routed = i.routes.iter().find(|(p, _)| *p == req.path).map(|(_, res)| Ok(res.clone()));
            i.requests.push(req);
            (routed.or_else(|| i.responses.pop_front()), i.send_delay)
        });
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        next.unwrap_or_else(|| Err(Error::Transport("no scripted response".into())))
    }

    async fn stream(&self, req: HttpRequest) -> Result<ByteStream> {
        let next = self.with(|i| {
            i.requests.push(req);
            i.streams.pop_front()
        });
        next.unwrap_or_else(|| Ok(futures::stream::pending().boxed()))
    }
}

pub fn fast_config() -> ClientConfig {
    ClientConfig {
        watch_backoff_base: Duration::from_millis(10),
        watch_backoff_max: Duration::from_millis(50),
        ..ClientConfig::default()
    }
}

pub fn client(fake: &Arc<FakeTransport>, config: ClientConfig) -> KubeClient {
    KubeClient::new(fake.clone(), Registry::builtin(), config)
}

pub fn cm(name: &str, rv: &str) -> Json {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name, "namespace": "ns", "resourceVersion": rv },
        "data": { "rv": rv }
    })
}

pub fn cm_list(rv: &str, items: Vec<Json>, continue_token: Option<&str>) -> Json {
    let mut meta = json!({ "resourceVersion": rv });
    if let Some(c) = continue_token {
        meta["continue"] = json!(c);
    }
    json!({ "apiVersion": "v1", "kind": "ConfigMapList", "metadata": meta, "items": items })
}

pub fn event(event_type: &str, object: Json) -> String {
    format!("{}\n", json!({ "type": event_type, "object": object }))
}

pub fn status(code: u16, reason: &str, message: &str) -> Json {
    json!({ "kind": "Status", "apiVersion": "v1", "status": "Failure", "message": message, "reason": reason, "code": code })
}

pub fn bookmark(rv: &str) -> String {
    event("BOOKMARK", json!({ "kind": "ConfigMap", "apiVersion": "v1", "metadata": { "resourceVersion": rv } }))
}

/// Flips its flag when dropped; put one inside a scripted stream to observe connection teardown.
pub struct DropGuard(pub Arc<AtomicBool>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub async fn wait_for(flag: &AtomicBool, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    flag.load(Ordering::SeqCst)
}
