//! Watch Stream Reader.
//!
//! A single watch connection as a `Stream` of [`WatchEvent`]s. The sequence ends when
//! the connection closes (EOF, transport reset, idle timeout) or on a terminal error.
//! An `Expired`/`Gone` error event surfaces as [`Error::ResourceVersionTooOld`].

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::{Future, Stream, StreamExt};
use kubeline_core::{Error, KubeApiError, Result, Status, WatchEvent, WatchEventType};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value as Json;
use tokio::time::{Instant, Sleep};
use tracing::{debug, warn};

use crate::transport::ByteStream;
use crate::typed::KubeObject;

/// Lifecycle of one watch connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Connecting,
    Streaming,
    /// Ended normally; resume from [`WatchStream::last_resource_version`].
    Closed,
    /// Ended with an error, which was the last item yielded.
    Errored,
}

enum Phase {
    Connecting(BoxFuture<'static, Result<ByteStream>>),
    Streaming(ByteStream),
    Done,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: WatchEventType,
    #[serde(default)]
    object: Json,
}

enum Step {
    Connected(ByteStream),
    Failed(Error),
    Chunk(Bytes),
    Reset(Error),
    Eof,
    Waiting,
}

pub struct WatchStream<K> {
    phase: Phase,
    state: WatchState,
    buf: BytesMut,
    /// Prefix of `buf` already known to hold no newline.
    scanned: usize,
    max_line: usize,
    pending: VecDeque<Result<WatchEvent<K>>>,
    idle: Duration,
    idle_timer: Option<Pin<Box<Sleep>>>,
    last_rv: String,
}

// K is only ever held by value in the queue; nothing is pin-projected.
impl<K> Unpin for WatchStream<K> {}

impl<K> fmt::Debug for WatchStream<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchStream").field("state", &self.state).field("last_rv", &self.last_rv).finish()
    }
}

impl<K: KubeObject> WatchStream<K> {
    pub(crate) fn connect(
        connect: BoxFuture<'static, Result<ByteStream>>,
        idle: Duration,
        resource_version: &str,
    ) -> Self {
        Self {
            phase: Phase::Connecting(connect),
            state: WatchState::Connecting,
            buf: BytesMut::new(),
            scanned: 0,
            max_line: usize::MAX,
            pending: VecDeque::new(),
            idle,
            idle_timer: None,
            last_rv: resource_version.to_string(),
        }
    }

    pub(crate) fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Newest resourceVersion seen on this connection (bookmarks included),
    /// or the version the watch started from.
    pub fn last_resource_version(&self) -> &str {
        &self.last_rv
    }

    fn touch(&mut self) {
        let deadline = Instant::now() + self.idle;
        match &mut self.idle_timer {
            Some(timer) => timer.as_mut().reset(deadline),
            None => self.idle_timer = Some(Box::pin(tokio::time::sleep_until(deadline))),
        }
    }

    fn finish(&mut self, state: WatchState) {
        self.state = state;
        self.phase = Phase::Done;
        self.buf.clear();
        self.scanned = 0;
        self.idle_timer = None;
    }

    fn fail(&mut self, err: Error) {
        self.pending.push_back(Err(err));
        self.finish(WatchState::Errored);
    }

    /// Split complete lines off the buffer and decode them.
    fn drain_lines(&mut self) {
        while let Some(off) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + off;
            let line = self.buf.split_to(pos + 1);
            self.scanned = 0;
            self.handle_line(&line[..pos]);
            if matches!(self.phase, Phase::Done) {
                return;
            }
        }
        self.scanned = self.buf.len();
        if self.buf.len() > self.max_line {
            warn!(buffered = self.buf.len(), max = self.max_line, "watch event line too long");
            self.fail(Error::Transport(format!("watch event exceeds {} bytes", self.max_line)));
        }
    }

    fn handle_line(&mut self, line: &[u8]) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            return;
        }
        let value: Json = match serde_json::from_slice(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "undecodable watch line");
                self.pending.push_back(Err(Error::decode("watch event", e)));
                return;
            }
        };
        if value.get("type").is_none() && Status::matches(&value) {
            // a bare Status in place of the event stream
            let st: Status = serde_json::from_value(value).unwrap_or_default();
            self.fail(Error::Api(KubeApiError::from_status(&st, 500)));
            return;
        }
        let Envelope { event_type, object } = match serde_json::from_value(value) {
            Ok(env) => env,
            Err(e) => {
                self.pending.push_back(Err(Error::decode("watch event", e)));
                return;
            }
        };
        counter!("watch_events", 1u64);
        match event_type {
            WatchEventType::Error => {
                let st: Status = serde_json::from_value(object).unwrap_or_default();
                let api = KubeApiError::from_status(&st, 500);
                if api.is_gone() {
                    debug!(rv = %self.last_rv, reason = %api.reason, "watch history expired");
                    self.fail(Error::ResourceVersionTooOld(self.last_rv.clone()));
                } else {
                    self.fail(Error::Api(api));
                }
            }
            WatchEventType::Bookmark => {
                let rv = object
                    .get("metadata")
                    .and_then(|m| m.get("resourceVersion"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                if !rv.is_empty() {
                    self.last_rv = rv.clone();
                    self.pending.push_back(Ok(WatchEvent::bookmark(rv)));
                }
            }
            WatchEventType::Added | WatchEventType::Modified | WatchEventType::Deleted => {
                match serde_json::from_value::<K>(object) {
                    Ok(obj) => {
                        let rv = obj.resource_version().unwrap_or_default().to_string();
                        if !rv.is_empty() {
                            self.last_rv = rv.clone();
                        }
                        self.pending.push_back(Ok(WatchEvent { event_type, object: Some(obj), resource_version: rv }));
                    }
                    Err(e) => self.pending.push_back(Err(Error::decode("watch event object", e))),
                }
            }
        }
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        match &mut self.phase {
            Phase::Done => Step::Eof,
            Phase::Connecting(fut) => match fut.as_mut().poll(cx) {
                Poll::Ready(Ok(stream)) => Step::Connected(stream),
                Poll::Ready(Err(e)) => Step::Failed(e),
                Poll::Pending => Step::Waiting,
            },
            Phase::Streaming(stream) => match stream.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(chunk))) => Step::Chunk(chunk),
                Poll::Ready(Some(Err(e))) => Step::Reset(e),
                Poll::Ready(None) => Step::Eof,
                Poll::Pending => Step::Waiting,
            },
        }
    }
}

impl<K: KubeObject> Stream for WatchStream<K> {
    type Item = Result<WatchEvent<K>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if matches!(this.phase, Phase::Done) {
                return Poll::Ready(None);
            }
            match this.step(cx) {
                Step::Connected(stream) => {
                    debug!(rv = %this.last_rv, "watch streaming");
                    this.phase = Phase::Streaming(stream);
                    this.state = WatchState::Streaming;
                    this.touch();
                }
                Step::Failed(e) => this.fail(e),
                Step::Chunk(chunk) => {
                    this.buf.extend_from_slice(&chunk);
                    this.touch();
                    this.drain_lines();
                }
                Step::Reset(e) => {
                    debug!(error = %e, rv = %this.last_rv, "watch connection reset");
                    this.finish(WatchState::Closed);
                }
                Step::Eof => {
                    if !this.buf.is_empty() {
                        this.scanned = 0;
                        let tail = this.buf.split();
                        this.handle_line(&tail);
                    }
                    if !matches!(this.phase, Phase::Done) {
                        debug!(rv = %this.last_rv, "watch closed by server");
                        this.finish(WatchState::Closed);
                    }
                }
                Step::Waiting => {
                    let idle = match &mut this.idle_timer {
                        Some(timer) if matches!(this.phase, Phase::Streaming(_)) => timer.as_mut().poll(cx).is_ready(),
                        _ => false,
                    };
                    if !idle {
                        return Poll::Pending;
                    }
                    debug!(idle = ?this.idle, rv = %this.last_rv, "watch idle, closing");
                    this.finish(WatchState::Closed);
                }
            }
        }
    }
}
