//! Container logs through the `/log` subresource.

use std::collections::VecDeque;

use bytes::BytesMut;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use kubeline_core::{Result, Verb};
use tracing::{debug, info, warn};

use crate::dispatcher::Query;
use crate::transport::ByteStream;
use crate::typed::{KubeObject, TypedClient};

/// Query options for `GET .../log`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Required when the pod runs more than one container.
    pub container: Option<String>,
    pub follow: bool,
    pub tail_lines: Option<i64>,
    pub since_seconds: Option<i64>,
    pub timestamps: bool,
    /// Logs of the previous (terminated) container instance.
    pub previous: bool,
}

impl LogOptions {
    pub(crate) fn query(&self) -> Query {
        let mut q: Query = Vec::new();
        if let Some(c) = &self.container {
            q.push(("container", c.clone()));
        }
        if self.follow {
            q.push(("follow", "true".to_string()));
        }
        if let Some(n) = self.tail_lines {
            q.push(("tailLines", n.to_string()));
        }
        if let Some(s) = self.since_seconds {
            q.push(("sinceSeconds", s.to_string()));
        }
        if self.timestamps {
            q.push(("timestamps", "true".to_string()));
        }
        if self.previous {
            q.push(("previous", "true".to_string()));
        }
        q
    }
}

/// Log lines without their terminators. Ends on EOF or after yielding a transport error.
pub type LogLines = BoxStream<'static, Result<String>>;

impl<K: KubeObject> TypedClient<K> {
    /// Whole log text in one response; `follow` is ignored.
    pub async fn logs(&self, name: &str, opts: &LogOptions) -> Result<String> {
        let opts = LogOptions { follow: false, ..opts.clone() };
        let bytes = self
            .dispatcher
            .execute_raw(&self.descriptor, Verb::GetLog, &self.params(Some(name)), &opts.query(), None)
            .await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Stream log lines; with `follow` the stream stays open while the container runs.
    pub async fn log_lines(&self, name: &str, opts: &LogOptions) -> Result<LogLines> {
        let params = self.params(Some(name));
        let stream = self.dispatcher.open_stream(&self.descriptor, Verb::GetLog, &params, &opts.query()).await?;
        info!(pod = %name, container = ?opts.container, follow = opts.follow, tail = ?opts.tail_lines, since = ?opts.since_seconds, "log stream opened");
        Ok(split_lines(stream))
    }
}

struct LineState {
    stream: ByteStream,
    buf: BytesMut,
    ready: VecDeque<String>,
    done: bool,
}

fn push_line(ready: &mut VecDeque<String>, raw: &[u8]) {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    ready.push_back(String::from_utf8_lossy(raw).into_owned());
}

fn split_lines(stream: ByteStream) -> LogLines {
    let state = LineState { stream, buf: BytesMut::new(), ready: VecDeque::new(), done: false };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.ready.pop_front() {
                return Some((Ok(line), st));
            }
            if st.done {
                return None;
            }
            match st.stream.next().await {
                Some(Ok(chunk)) => {
                    let scanned = st.buf.len();
                    st.buf.extend_from_slice(&chunk);
                    let mut from = scanned;
                    while let Some(off) = st.buf[from..].iter().position(|&b| b == b'\n') {
                        let line = st.buf.split_to(from + off + 1);
                        push_line(&mut st.ready, &line[..line.len() - 1]);
                        from = 0;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "log stream error");
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.done = true;
                    if !st.buf.is_empty() {
                        let tail = st.buf.split();
                        push_line(&mut st.ready, &tail);
                    }
                    debug!("log stream ended");
                }
            }
        }
    })
    .boxed()
}
