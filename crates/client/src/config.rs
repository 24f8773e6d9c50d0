use std::str::FromStr;
use std::time::Duration;

/// Client-wide knobs. [`ClientConfig::from_env`] reads `KUBELINE_*` overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Namespace used by `default_namespaced` clients.
    pub default_namespace: String,
    /// Deadline for single-verb calls and for opening a watch.
    pub request_timeout: Duration,
    /// A watch with no bytes for this long is closed (not an error).
    pub watch_idle_timeout: Duration,
    /// Longest watch event line buffered before the connection is failed.
    pub watch_max_line_bytes: usize,
    /// Server-side `timeoutSeconds` sent with watch requests.
    pub watch_timeout_secs: Option<u32>,
    pub watch_backoff_base: Duration,
    pub watch_backoff_max: Duration,
    /// Non-transient resync failures retried before the error is delivered and the subscription ends.
    pub max_resync_failures: u32,
    /// Per-subscription event queue capacity.
    pub queue_cap: usize,
    /// `limit` for list pages; `None` lists in one request.
    pub page_size: Option<u32>,
    /// On a cleanly closed watch: relist (true) or reconnect at the last seen version.
    pub relist_on_close: bool,
    /// Ask for and forward BOOKMARK events.
    pub bookmarks: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_namespace: "default".to_string(),
            request_timeout: Duration::from_secs(30),
            watch_idle_timeout: Duration::from_secs(330),
            watch_max_line_bytes: 16 * 1024 * 1024,
            watch_timeout_secs: Some(290),
            watch_backoff_base: Duration::from_millis(500),
            watch_backoff_max: Duration::from_secs(30),
            max_resync_failures: 5,
            queue_cap: 1024,
            page_size: Some(500),
            relist_on_close: true,
            bookmarks: true,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            default_namespace: std::env::var("KUBELINE_NAMESPACE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(d.default_namespace),
            request_timeout: env_parse("KUBELINE_REQUEST_TIMEOUT_SECS").map(Duration::from_secs).unwrap_or(d.request_timeout),
            watch_idle_timeout: env_parse("KUBELINE_WATCH_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.watch_idle_timeout),
            watch_max_line_bytes: env_parse::<usize>("KUBELINE_WATCH_MAX_LINE_BYTES")
                .filter(|n| *n > 0)
                .unwrap_or(d.watch_max_line_bytes),
            watch_timeout_secs: match env_parse::<u32>("KUBELINE_WATCH_TIMEOUT_SECS") {
                Some(0) => None,
                Some(n) => Some(n),
                None => d.watch_timeout_secs,
            },
            watch_backoff_base: d.watch_backoff_base,
            watch_backoff_max: env_parse("KUBELINE_WATCH_BACKOFF_MAX_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.watch_backoff_max),
            max_resync_failures: env_parse("KUBELINE_MAX_RESYNC_FAILURES").unwrap_or(d.max_resync_failures),
            queue_cap: env_parse::<usize>("KUBELINE_QUEUE_CAP").filter(|n| *n > 0).unwrap_or(d.queue_cap),
            page_size: match env_parse::<u32>("KUBELINE_PAGE_SIZE") {
                Some(0) => None,
                Some(n) => Some(n),
                None => d.page_size,
            },
            relist_on_close: env_flag("KUBELINE_RELIST_ON_CLOSE").unwrap_or(d.relist_on_close),
            bookmarks: env_flag("KUBELINE_BOOKMARKS").unwrap_or(d.bookmarks),
        }
    }
}

/// Capped exponential backoff between resync attempts.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, next: base }
    }

    pub fn next_delay(&mut self) -> Duration {
        let cur = self.next.min(self.max);
        self.next = (cur * 2).min(self.max);
        cur
    }

    pub fn reset(&mut self) {
        self.next = self.base;
    }
}
