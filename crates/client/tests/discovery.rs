#![forbid(unsafe_code)]

mod common;

use common::*;
use kubeline_client::{ClientConfig, Error, ListOptions};
use kubeline_core::Verb;
use serde_json::{json, Value as Json};

fn resource(name: &str, kind: &str, namespaced: bool, verbs: &[&str]) -> Json {
    json!({ "name": name, "singularName": "", "kind": kind, "namespaced": namespaced, "verbs": verbs })
}

fn resource_list(group_version: &str, resources: Vec<Json>) -> Json {
    json!({ "kind": "APIResourceList", "apiVersion": "v1", "groupVersion": group_version, "resources": resources })
}

fn script_cluster(fake: &FakeTransport) {
    fake.route("/api", 200, json!({ "kind": "APIVersions", "versions": ["v1"], "serverAddressByClientCIDRs": [] }));
    fake.route(
        "/apis",
        200,
        json!({ "kind": "APIGroupList", "apiVersion": "v1", "groups": [
            {
                "name": "example.com",
                "versions": [
                    { "groupVersion": "example.com/v1", "version": "v1" },
                    { "groupVersion": "example.com/v1beta1", "version": "v1beta1" }
                ],
                "preferredVersion": { "groupVersion": "example.com/v1", "version": "v1" }
            },
            {
                "name": "metrics.k8s.io",
                "versions": [ { "groupVersion": "metrics.k8s.io/v1beta1", "version": "v1beta1" } ]
            }
        ] }),
    );
    fake.route(
        "/api/v1",
        200,
        resource_list("v1", vec![resource("configmaps", "ConfigMap", true, &["get", "list"])]),
    );
    fake.route(
        "/apis/example.com/v1",
        200,
        resource_list(
            "example.com/v1",
            vec![
                resource("widgets", "Widget", true, &["get", "list", "watch", "create", "update", "patch", "delete"]),
                resource("widgets/status", "Widget", true, &["get", "patch", "update"]),
            ],
        ),
    );
    fake.route("/apis/metrics.k8s.io/v1beta1", 503, status(503, "ServiceUnavailable", "metrics backend down"));
}

#[tokio::test]
async fn discovery_makes_custom_kinds_dynamic() {
    let fake = FakeTransport::new();
    script_cluster(&fake);
    let kc = client(&fake, ClientConfig::default());
    assert!(matches!(kc.dynamic("example.com/v1/Widget", Some("ns")), Err(Error::UnknownResourceType(_))));

    let discovered = kc.discover().await.expect("discover");
    let widgets = discovered.dynamic("example.com/v1/Widget", Some("ns")).expect("widget client");
    assert!(widgets.descriptor().status_subresource);
    assert!(widgets.descriptor().supports(Verb::UpdateStatus));
    assert!(!widgets.descriptor().supports(Verb::DeleteCollection));

    let paths: Vec<String> = fake.requests().into_iter().map(|r| r.path).collect();
    assert!(paths.contains(&"/apis/metrics.k8s.io/v1beta1".to_string()));
    assert!(!paths.contains(&"/apis/example.com/v1beta1".to_string()), "{:?}", paths);

    fake.respond(200, json!({ "apiVersion": "example.com/v1", "kind": "WidgetList", "metadata": { "resourceVersion": "4" }, "items": [] }));
    let page = widgets.list(&ListOptions::default()).await.expect("list");
    assert_eq!(page.resource_version, "4");
    assert_eq!(fake.requests().last().map(|r| r.path.clone()).as_deref(), Some("/apis/example.com/v1/namespaces/ns/widgets"));

    // the original client is untouched
    assert!(kc.dynamic("example.com/v1/Widget", None).is_err());
    // built-in descriptors survive discovery
    assert!(discovered.dynamic("v1/ConfigMap", None).expect("configmap").descriptor().supports(Verb::Create));
}

#[tokio::test]
async fn discovery_fails_when_the_group_index_is_unreadable() {
    let fake = FakeTransport::new();
    fake.route("/api", 200, json!({ "kind": "APIVersions", "versions": ["v1"], "serverAddressByClientCIDRs": [] }));
    fake.route("/apis", 403, status(403, "Forbidden", "discovery is forbidden"));
    let kc = client(&fake, ClientConfig::default());
    match kc.discover().await {
        Err(Error::Api(e)) => assert_eq!(e.status_code, 403),
        Err(other) => panic!("expected api error, got {:?}", other),
        Ok(_) => panic!("expected discovery to fail"),
    }
}
