#![forbid(unsafe_code)]

mod common;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common::*;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kubeline_client::{ClientConfig, Error, KubeApiError, ListOptions, WatchEventType, WatchState};

#[tokio::test]
async fn splits_lines_across_chunks_and_flushes_tail() {
    let fake = FakeTransport::new();
    let added = event("ADDED", cm("a", "5"));
    let (head, rest) = added.split_at(20);
    let modified = event("MODIFIED", cm("a", "6")).replace('\n', "\r\n");
    let deleted = event("DELETED", cm("a", "7"));
    fake.stream_chunks(vec![
        head.to_string(),
        format!("{}{}", rest, &modified[..10]),
        format!("{}\n", &modified[10..]),
        deleted.trim_end().to_string(),
    ]);
    let maps = client(&fake, ClientConfig::default()).namespaced::<ConfigMap>("ns").expect("client");

    let mut w = maps.watch("4", &ListOptions::default());
    assert_eq!(w.state(), WatchState::Connecting);
    let mut seen = Vec::new();
    while let Some(item) = w.next().await {
        let ev = item.expect("event");
        seen.push((ev.event_type, ev.resource_version));
    }
    assert_eq!(
        seen,
        vec![
            (WatchEventType::Added, "5".to_string()),
            (WatchEventType::Modified, "6".to_string()),
            (WatchEventType::Deleted, "7".to_string()),
        ]
    );
    assert_eq!(w.state(), WatchState::Closed);
    assert_eq!(w.last_resource_version(), "7");

    let req = &fake.requests()[0];
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/api/v1/namespaces/ns/configmaps");
    assert_eq!(req.query_value("watch"), Some("true"));
    assert_eq!(req.query_value("resourceVersion"), Some("4"));
    assert_eq!(req.query_value("allowWatchBookmarks"), Some("true"));
    assert_eq!(req.query_value("timeoutSeconds"), Some("290"));
}

#[tokio::test]
async fn expired_event_ends_with_resource_version_too_old() {
    let fake = FakeTransport::new();
    fake.stream_chunks(vec![
        event("ADDED", cm("a", "10")),
        event("ERROR", status(410, "Expired", "too old resource version: 5 (10)")),
        event("ADDED", cm("b", "11")),
    ]);
    let c = client(&fake, ClientConfig::default()).namespaced::<ConfigMap>("ns").expect("client");
    let mut w = c.watch("5", &ListOptions::default());

    let first = w.next().await.expect("item").expect("event");
    assert_eq!(first.event_type, WatchEventType::Added);
    match w.next().await {
        Some(Err(Error::ResourceVersionTooOld(rv))) => assert_eq!(rv, "10"),
        other => panic!("expected too-old, got {:?}", other),
    }
    assert!(w.next().await.is_none());
    assert_eq!(w.state(), WatchState::Errored);
}

#[tokio::test]
async fn other_error_events_surface_as_api_errors() {
    let fake = FakeTransport::new();
    fake.stream_chunks(vec![event("ERROR", status(500, "InternalError", "etcd unavailable"))]);
    let c = client(&fake, ClientConfig::default()).namespaced::<ConfigMap>("ns").expect("client");
    let mut w = c.watch("1", &ListOptions::default());
    match w.next().await {
        Some(Err(Error::Api(e))) => {
            assert_eq!(e.status_code, 500);
            assert_eq!(e.reason, "InternalError");
        }
        other => panic!("expected api error, got {:?}", other),
    }
    assert!(w.next().await.is_none());
    assert_eq!(w.state(), WatchState::Errored);
}

#[tokio::test]
async fn status_body_instead_of_stream_errors() {
    let fake = FakeTransport::new();
    fake.stream_chunks(vec![format!("{}\n", status(403, "Forbidden", "configmaps is forbidden"))]);
    let c = client(&fake, ClientConfig::default()).namespaced::<ConfigMap>("ns").expect("client");
    let mut w = c.watch("1", &ListOptions::default());
    match w.next().await {
        Some(Err(Error::Api(e))) => assert_eq!(e.status_code, 403),
        other => panic!("expected api error, got {:?}", other),
    }
    assert_eq!(w.state(), WatchState::Errored);
}

#[tokio::test]
async fn connect_failure_errors() {
    let fake = FakeTransport::new();
    fake.stream_err(Error::Api(KubeApiError::new(401, "Unauthorized", "")));
    let c = client(&fake, ClientConfig::default()).namespaced::<ConfigMap>("ns").expect("client");
    let mut w = c.watch("1", &ListOptions::default());
    assert!(matches!(w.next().await, Some(Err(Error::Api(e))) if e.status_code == 401));
    assert!(w.next().await.is_none());
    assert_eq!(w.state(), WatchState::Errored);
}

#[tokio::test]
async fn bookmarks_advance_resume_version() {
    let fake = FakeTransport::new();
    fake.stream_chunks(vec![event("ADDED", cm("a", "3")), bookmark("42")]);
    let c = client(&fake, ClientConfig::default()).namespaced::<ConfigMap>("ns").expect("client");
    let mut w = c.watch("1", &ListOptions::default());
    let _ = w.next().await;
    let bm = w.next().await.expect("item").expect("bookmark");
    assert_eq!(bm.event_type, WatchEventType::Bookmark);
    assert!(bm.object.is_none());
    assert_eq!(bm.resource_version, "42");
    assert_eq!(w.last_resource_version(), "42");
}

#[tokio::test]
async fn undecodable_event_is_not_terminal() {
    let fake = FakeTransport::new();
    fake.stream_chunks(vec!["{not json\n".to_string(), event("ADDED", cm("a", "3"))]);
    let c = client(&fake, ClientConfig::default()).namespaced::<ConfigMap>("ns").expect("client");
    let mut w = c.watch("1", &ListOptions::default());
    assert!(matches!(w.next().await, Some(Err(Error::Decode { .. }))));
    assert!(w.next().await.expect("item").is_ok());
    assert!(w.next().await.is_none());
    assert_eq!(w.state(), WatchState::Closed);
}

#[tokio::test]
async fn transport_reset_closes_without_error() {
    let fake = FakeTransport::new();
    let line = event("ADDED", cm("a", "3"));
    let s = async_stream::stream! {
        yield Ok::<Bytes, Error>(Bytes::from(line));
        yield Err(Error::Transport("connection reset by peer".into()));
    };
    fake.stream(s.boxed());
    let c = client(&fake, ClientConfig::default()).namespaced::<ConfigMap>("ns").expect("client");
    let mut w = c.watch("1", &ListOptions::default());
    assert!(w.next().await.expect("item").is_ok());
    assert!(w.next().await.is_none());
    assert_eq!(w.state(), WatchState::Closed);
}

#[tokio::test]
async fn idle_watch_closes_without_error() {
    let fake = FakeTransport::new();
    fake.stream_then_hang(vec![event("ADDED", cm("a", "3"))]);
    let config = ClientConfig { watch_idle_timeout: Duration::from_millis(50), ..ClientConfig::default() };
    let c = client(&fake, config).namespaced::<ConfigMap>("ns").expect("client");
    let mut w = c.watch("1", &ListOptions::default());
    assert!(w.next().await.expect("item").is_ok());
    let end = tokio::time::timeout(Duration::from_secs(2), w.next()).await.expect("idle timeout did not fire");
    assert!(end.is_none());
    assert_eq!(w.state(), WatchState::Closed);
    assert_eq!(w.last_resource_version(), "3");
}

#[tokio::test]
async fn dropping_the_stream_closes_the_connection() {
    let fake = FakeTransport::new();
    let closed = Arc::new(AtomicBool::new(false));
    let guard = DropGuard(closed.clone());
    let s = async_stream::stream! {
        let _guard = guard;
        let mut rv = 1u64;
        loop {
            rv += 1;
            yield Ok::<Bytes, Error>(Bytes::from(event("MODIFIED", cm("a", &rv.to_string()))));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    fake.stream(s.boxed());
    let c = client(&fake, ClientConfig::default()).namespaced::<ConfigMap>("ns").expect("client");
    let mut w = c.watch("1", &ListOptions::default());
    assert!(w.next().await.expect("item").is_ok());
    drop(w);
    assert!(wait_for(&closed, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn overlong_event_line_fails_the_watch() {
    let fake = FakeTransport::new();
    let mut big = "{\"type\":\"ADDED\",\"object\":".to_string();
    big.push_str(&"x".repeat(300));
    let (head, tail) = big.split_at(150);
    fake.stream_then_hang(vec![head.to_string(), tail.to_string()]);
    let config = ClientConfig { watch_max_line_bytes: 256, ..ClientConfig::default() };
    let c = client(&fake, config).namespaced::<ConfigMap>("ns").expect("client");
    let mut w = c.watch("1", &ListOptions::default());
    let end = tokio::time::timeout(Duration::from_secs(2), w.next()).await.expect("no item within 2s");
    assert!(matches!(end, Some(Err(Error::Transport(_)))), "{:?}", end);
    assert!(w.next().await.is_none());
    assert_eq!(w.state(), WatchState::Errored);
}
