#![forbid(unsafe_code)]

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kubeline_patch::{apply_patch, compute_patch, compute_patch_typed, normalize, PatchOp};
use kubeline_registry::schemas::{CONFIG_MAP, DEPLOYMENT, POD};
use serde_json::{json, Value as Json};

fn container(name: &str, image: &str, env: &[(&str, &str)]) -> Container {
    Container {
        name: name.into(),
        image: Some(image.into()),
        env: if env.is_empty() {
            None
        } else {
            Some(env.iter().map(|(k, v)| EnvVar { name: (*k).into(), value: Some((*v).into()), ..Default::default() }).collect())
        },
        ..Default::default()
    }
}

fn deployment(replicas: i32, containers: Vec<Container>) -> Deployment {
    let labels = [("app".to_string(), "web".to_string())].into_iter().collect();
    Deployment {
        metadata: ObjectMeta {
            name: Some("web".into()),
            namespace: Some("prod".into()),
            resource_version: Some("41".into()),
            labels: Some([("app".to_string(), "web".to_string())].into_iter().collect()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector { match_labels: Some(labels), ..Default::default() },
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec { containers, ..Default::default() }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn assert_round_trip(old: &Json, new: &Json, schema: &kubeline_patch::TypeSchema) {
    let doc = compute_patch(old, new, schema).expect("patch");
    let mut applied = old.clone();
    apply_patch(&mut applied, &doc).expect("apply");
    assert_eq!(normalize(&applied, schema), normalize(new, schema), "ops: {:?}", doc.ops());
}

#[test]
fn typed_deployment_changes_merge_by_container_name() {
    let old = deployment(2, vec![container("web", "nginx:1", &[("A", "1")]), container("sidecar", "envoy:1", &[])]);
    let new = deployment(
        3,
        vec![container("log", "busybox", &[]), container("web", "nginx:2", &[("A", "1"), ("B", "2")])],
    );
    let doc = compute_patch_typed(&old, &new, &DEPLOYMENT).expect("patch");

    let rendered: Vec<String> = doc.ops().iter().map(|op| op.path().to_string()).collect();
    assert!(rendered.contains(&"/spec/replicas".to_string()), "{:?}", rendered);
    assert!(rendered.contains(&"/spec/template/spec/containers/[name=web]/image".to_string()), "{:?}", rendered);
    assert!(rendered.contains(&"/spec/template/spec/containers/[name=web]/env".to_string()), "{:?}", rendered);
    assert!(doc.ops().iter().any(|op| matches!(op, PatchOp::DeleteItem { value, .. } if value == "sidecar")));
    assert!(doc.ops().iter().any(|op| matches!(op, PatchOp::SetOrder { .. })));
    // resourceVersion is server-owned and never patched
    assert!(!rendered.iter().any(|p| p.contains("resourceVersion")));

    let summary = doc.summary();
    assert_eq!(summary.adds, 2);
    assert_eq!(summary.removes, 1);

    let old_json = serde_json::to_value(&old).expect("encode");
    let new_json = serde_json::to_value(&new).expect("encode");
    assert_round_trip(&old_json, &new_json, &DEPLOYMENT);
}

#[test]
fn conditions_merge_by_type() {
    let old = json!({
        "apiVersion": "v1", "kind": "Pod", "metadata": { "name": "p" },
        "status": { "conditions": [ { "type": "Ready", "status": "True" } ] }
    });
    let new = json!({
        "apiVersion": "v1", "kind": "Pod", "metadata": { "name": "p" },
        "status": { "conditions": [
            { "type": "Ready", "status": "False" },
            { "type": "Scheduled", "status": "True" }
        ] }
    });
    assert!(compute_patch(&old, &new, &POD).expect("patch").is_empty());
    let st = kubeline_patch::compute_status_patch(&old, &new, &POD).expect("status");
    assert_eq!(st.len(), 2);
    let mut applied = old.clone();
    apply_patch(&mut applied, &st).expect("apply");
    assert_eq!(applied["status"], new["status"]);
}

#[test]
fn round_trip_over_assorted_pairs() {
    let pairs = vec![
        (
            json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "c", "labels": { "a": "1" } }, "data": { "x": "1" } }),
            json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "c", "labels": { "a": null, "b": "2" } }, "data": { "x": "2", "y": "3" } }),
        ),
        (
            json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "c", "finalizers": ["a", "b"] } }),
            json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "c", "finalizers": ["b"] }, "binaryData": { "k": "AA==" } }),
        ),
        (
            json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "c" }, "data": null }),
            json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "c", "ownerReferences": [ { "uid": "u1", "kind": "X" } ] }, "data": { "k": "v" } }),
        ),
    ];
    for (old, new) in &pairs {
        assert_round_trip(old, new, &CONFIG_MAP);
    }

    let pod_old = json!({
        "apiVersion": "v1", "kind": "Pod", "metadata": { "name": "p" },
        "spec": { "containers": [ { "name": "a", "ports": [ { "containerPort": 80 } ] } ], "tolerations": [ { "key": "x" } ] }
    });
    let pod_new = json!({
        "apiVersion": "v1", "kind": "Pod", "metadata": { "name": "p" },
        "spec": { "containers": [ { "name": "a", "ports": [ { "containerPort": 8080 }, { "containerPort": 80, "protocol": "TCP" } ] } ], "tolerations": [] }
    });
    assert_round_trip(&pod_old, &pod_new, &POD);
}

#[test]
fn strategic_body_for_typed_change() {
    let old = deployment(2, vec![container("web", "nginx:1", &[])]);
    let mut new = old.clone();
    if let Some(pod) = new.spec.as_mut().and_then(|s| s.template.spec.as_mut()) {
        pod.containers[0].ports = Some(vec![ContainerPort { container_port: 80, ..Default::default() }]);
    }
    let doc = compute_patch_typed(&old, &new, &DEPLOYMENT).expect("patch");
    assert_eq!(
        doc.to_strategic_merge(),
        json!({ "spec": { "template": { "spec": { "containers": [ { "name": "web", "ports": [ { "containerPort": 80 } ] } ] } } } })
    );
}

#[test]
fn removed_finalizers_are_deleted_from_the_server_set() {
    let old = json!({
        "apiVersion": "v1", "kind": "ConfigMap",
        "metadata": { "name": "cfg", "finalizers": ["example.com/a", "example.com/b"] }
    });
    let mut new = old.clone();
    new["metadata"]["finalizers"] = json!(["example.com/b", "example.com/c"]);

    let doc = compute_patch(&old, &new, &CONFIG_MAP).expect("patch");
    assert_eq!(
        doc.to_strategic_merge(),
        json!({ "metadata": {
            "$deleteFromPrimitiveList/finalizers": ["example.com/a"],
            "finalizers": ["example.com/c"]
        } })
    );
    assert_round_trip(&old, &new, &CONFIG_MAP);
}
