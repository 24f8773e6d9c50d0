//! List-Watch Reconciler.
//!
//! One background task per subscription: list, replay as `Added`, watch from the
//! list's resourceVersion, and on any break relist and bridge the gap against the
//! objects already delivered. Events reach the consumer through a bounded channel.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use kubeline_core::{Error, ListPage, Result, WatchEvent, WatchEventType};
use metrics::counter;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::Backoff;
use crate::typed::{KubeObject, ListOptions, TypedClient};

/// Live event feed for one kind (and namespace / selector).
///
/// Ends only when cancelled, dropped, or after a resync gives up (the last item is then the error).
pub struct Subscription<K> {
    rx: mpsc::Receiver<Result<WatchEvent<K>>>,
    cancel: Option<oneshot::Sender<()>>,
    cancelled: bool,
}

impl<K> Subscription<K> {
    /// Stop immediately; nothing further is yielded and the connection is dropped.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        self.rx.close();
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<K> Drop for Subscription<K> {
    fn drop(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }
}

impl<K> Stream for Subscription<K> {
    type Item = Result<WatchEvent<K>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancelled {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl<K: KubeObject> TypedClient<K> {
    /// Start a list-watch subscription. The initial list (all pages) completes before
    /// this returns, so a failing List surfaces here rather than on the stream.
    pub async fn subscribe(&self, opts: ListOptions) -> Result<Subscription<K>> {
        let initial = self.list_all(&opts).await?;
        info!(gvk = %self.descriptor.gvk, ns = ?self.namespace, items = initial.items.len(), rv = %initial.resource_version, "subscription started");
        let (tx, rx) = mpsc::channel(self.config.queue_cap.max(1));
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let reconciler = Reconciler::new(self.clone(), opts, tx);
        let gvk = self.descriptor.gvk.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_rx => debug!(gvk = %gvk, "subscription cancelled"),
                _ = reconciler.run(initial) => debug!(gvk = %gvk, "subscription ended"),
            }
        });
        Ok(Subscription { rx, cancel: Some(cancel_tx), cancelled: false })
    }
}

enum WatchEnd {
    /// Server or idle close; `delivered` says whether the connection carried anything.
    Closed { delivered: bool },
    TooOld,
    Failed(Error),
    ConsumerGone,
}

struct ConsumerGone;

struct Reconciler<K> {
    client: TypedClient<K>,
    opts: ListOptions,
    tx: mpsc::Sender<Result<WatchEvent<K>>>,
    known: FxHashMap<String, K>,
    /// resourceVersion of the last delivered delete per key, until a relist supersedes it.
    tombstones: FxHashMap<String, String>,
    backoff: Backoff,
}

/// Numeric comparison of resourceVersions; opaque (non-numeric) versions never compare as older.
fn is_older(candidate: &str, seen: &str) -> bool {
    match (candidate.parse::<u64>(), seen.parse::<u64>()) {
        (Ok(c), Ok(s)) => c < s,
        _ => false,
    }
}

fn is_newer(candidate: &str, seen: &str) -> bool {
    candidate != seen && !is_older(candidate, seen)
}

impl<K: KubeObject> Reconciler<K> {
    fn new(client: TypedClient<K>, opts: ListOptions, tx: mpsc::Sender<Result<WatchEvent<K>>>) -> Self {
        let backoff = Backoff::new(client.config.watch_backoff_base, client.config.watch_backoff_max);
        Self { client, opts, tx, known: FxHashMap::default(), tombstones: FxHashMap::default(), backoff }
    }

    async fn run(mut self, initial: ListPage<K>) {
        let mut rv = initial.resource_version.clone();
        if self.bridge(initial).await.is_err() {
            return;
        }
        loop {
            let end = self.watch_once(&mut rv).await;
            counter!("watch_restarts", 1u64);
            match end {
                WatchEnd::ConsumerGone => return,
                WatchEnd::Closed { delivered } => {
                    if !delivered {
                        tokio::time::sleep(self.backoff.next_delay()).await;
                    }
                    if !self.client.config.relist_on_close {
                        debug!(rv = %rv, "reconnecting watch");
                        continue;
                    }
                }
                WatchEnd::TooOld => debug!(rv = %rv, "resourceVersion expired, relisting"),
                WatchEnd::Failed(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(gvk = %self.client.descriptor.gvk, error = %e, delay_ms = delay.as_millis() as u64, "watch failed, resyncing");
                    tokio::time::sleep(delay).await;
                }
            }
            match self.resync().await {
                Some(fresh) => rv = fresh,
                None => return,
            }
        }
    }

    async fn watch_once(&mut self, rv: &mut String) -> WatchEnd {
        let mut stream = self.client.watch(rv, &self.opts);
        let mut delivered = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(ev) => {
                    delivered = true;
                    if self.deliver(ev).await.is_err() {
                        return WatchEnd::ConsumerGone;
                    }
                }
                Err(Error::ResourceVersionTooOld(_)) => return WatchEnd::TooOld,
                Err(e @ Error::Decode { .. }) => warn!(error = %e, "skipping undecodable watch event"),
                Err(e) => return WatchEnd::Failed(e),
            }
        }
        *rv = stream.last_resource_version().to_string();
        if delivered {
            self.backoff.reset();
        }
        WatchEnd::Closed { delivered }
    }

    /// Forward one watch event, dropping any that would move an object backwards,
    /// including past its own delete.
    async fn deliver(&mut self, ev: WatchEvent<K>) -> std::result::Result<(), ConsumerGone> {
        if let Some(obj) = &ev.object {
            let key = obj.object_key();
            if self.is_stale(&key, &ev.resource_version) {
                debug!(key = %key, rv = %ev.resource_version, "dropping stale event");
                return Ok(());
            }
            match ev.event_type {
                WatchEventType::Added | WatchEventType::Modified => {
                    self.tombstones.remove(&key);
                    self.known.insert(key, obj.clone());
                }
                WatchEventType::Deleted => {
                    self.known.remove(&key);
                    self.tombstones.insert(key, ev.resource_version.clone());
                }
                WatchEventType::Bookmark | WatchEventType::Error => {}
            }
        }
        self.send(ev).await
    }

    fn is_stale(&self, key: &str, rv: &str) -> bool {
        if let Some(seen) = self.known.get(key).and_then(|k| k.resource_version()) {
            return is_older(rv, seen);
        }
        match self.tombstones.get(key) {
            Some(deleted) => !is_newer(rv, deleted),
            None => false,
        }
    }

    async fn send(&self, ev: WatchEvent<K>) -> std::result::Result<(), ConsumerGone> {
        self.tx.send(Ok(ev)).await.map_err(|_| ConsumerGone)
    }

    /// List until it succeeds or gives up. Returns the fresh resourceVersion.
    async fn resync(&mut self) -> Option<String> {
        counter!("reconcile_resyncs", 1u64);
        let limit = self.client.config.max_resync_failures;
        let mut failures = 0u32;
        loop {
            match self.client.list_all(&self.opts).await {
                Ok(page) => {
                    let rv = page.resource_version.clone();
                    return self.bridge(page).await.ok().map(|_| rv);
                }
                Err(e) if e.is_retryable() => {
                    warn!(gvk = %self.client.descriptor.gvk, error = %e, "resync list failed, retrying");
                }
                Err(e) => {
                    failures += 1;
                    warn!(gvk = %self.client.descriptor.gvk, error = %e, failures, limit, "resync list failed");
                    if failures > limit {
                        let _ = self.tx.send(Err(e)).await;
                        return None;
                    }
                }
            }
            if self.tx.is_closed() {
                return None;
            }
            tokio::time::sleep(self.backoff.next_delay()).await;
        }
    }

    /// Diff a full listing against what the consumer has seen and emit the difference:
    /// new objects as Added, changed ones as Modified, vanished ones as Deleted.
    async fn bridge(&mut self, page: ListPage<K>) -> std::result::Result<(), ConsumerGone> {
        let mut fresh: FxHashMap<String, K> = FxHashMap::default();
        let mut events = Vec::new();
        for obj in page.items {
            let key = obj.object_key();
            let rv = obj.resource_version().unwrap_or_default().to_string();
            let prev = self.known.remove(&key);
            if prev.is_none() && self.is_stale(&key, &rv) {
                continue;
            }
            match prev {
                None => events.push(WatchEvent::added(obj.clone(), rv)),
                Some(prev) => {
                    let seen = prev.resource_version().unwrap_or_default();
                    if seen == rv {
                        // unchanged
                    } else if is_older(&rv, seen) {
                        fresh.insert(key, prev);
                        continue;
                    } else {
                        events.push(WatchEvent::modified(obj.clone(), rv));
                    }
                }
            }
            fresh.insert(key, obj);
        }
        let mut vanished: Vec<(String, K)> = std::mem::take(&mut self.known).into_iter().collect();
        vanished.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, obj) in vanished {
            events.push(WatchEvent::deleted(obj, page.resource_version.clone()));
        }
        self.known = fresh;
        let list_rv = &page.resource_version;
        self.tombstones.retain(|key, deleted| !self.known.contains_key(key) && is_older(list_rv, deleted));
        debug!(gvk = %self.client.descriptor.gvk, events = events.len(), known = self.known.len(), "bridged listing");
        for ev in events {
            self.send(ev).await?;
        }
        Ok(())
    }
}
