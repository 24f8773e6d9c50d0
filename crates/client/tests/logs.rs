#![forbid(unsafe_code)]

mod common;

use common::*;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kubeline_client::{ClientConfig, Error, LogOptions};

#[tokio::test]
async fn logs_fetch_the_whole_text() {
    let fake = FakeTransport::new();
    fake.respond_raw(200, "starting\nready\n");
    let pods = client(&fake, ClientConfig::default()).namespaced::<Pod>("ns").expect("client");
    let opts = LogOptions { container: Some("app".into()), tail_lines: Some(10), follow: true, ..Default::default() };
    let text = pods.logs("web-0", &opts).await.expect("logs");
    assert_eq!(text, "starting\nready\n");

    let req = &fake.requests()[0];
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/api/v1/namespaces/ns/pods/web-0/log");
    assert_eq!(req.query_value("container"), Some("app"));
    assert_eq!(req.query_value("tailLines"), Some("10"));
    assert_eq!(req.query_value("follow"), None);
}

#[tokio::test]
async fn log_lines_split_across_chunks() {
    let fake = FakeTransport::new();
    fake.stream_chunks(vec!["one\ntw".to_string(), "o\r\n".to_string(), "\nlast".to_string()]);
    let pods = client(&fake, ClientConfig::default()).namespaced::<Pod>("ns").expect("client");
    let opts = LogOptions { follow: true, since_seconds: Some(60), ..Default::default() };
    let lines: Vec<String> =
        pods.log_lines("web-0", &opts).await.expect("stream").map(|l| l.expect("line")).collect().await;
    assert_eq!(lines, vec!["one", "two", "", "last"]);

    let req = &fake.requests()[0];
    assert_eq!(req.query_value("follow"), Some("true"));
    assert_eq!(req.query_value("sinceSeconds"), Some("60"));
}

#[tokio::test]
async fn kinds_without_logs_reject_the_verb() {
    let fake = FakeTransport::new();
    let maps = client(&fake, ClientConfig::default()).namespaced::<ConfigMap>("ns").expect("client");
    let err = maps.logs("a", &LogOptions::default()).await.expect_err("no logs");
    assert!(matches!(err, Error::UnsupportedVerb { .. }), "{:?}", err);
    assert!(fake.requests().is_empty());
}
