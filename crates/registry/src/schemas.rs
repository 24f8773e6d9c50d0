//! Merge-key schemas for the built-in workload and config kinds.
//!
//! Only fields that need a hint are listed: keyed lists, scalar sets,
//! atomic lists, string maps and server-populated fields. Everything else falls back to the
//! untyped rules in the patch engine.

use kubeline_core::{FieldSchema as F, TypeSchema};

static OWNER_REFERENCE: TypeSchema = TypeSchema::new("OwnerReference", &[]);
static MANAGED_FIELDS: TypeSchema = TypeSchema::new("ManagedFieldsEntry", &[]);

pub static OBJECT_META: TypeSchema = TypeSchema::new(
    "ObjectMeta",
    &[
        F::map("labels"),
        F::map("annotations"),
        F::set_list("finalizers"),
        F::keyed("ownerReferences", "uid", &OWNER_REFERENCE),
        F::keyed("managedFields", "manager", &MANAGED_FIELDS).read_only(),
        F::scalar("uid").read_only(),
        F::scalar("resourceVersion").read_only(),
        F::scalar("generation").read_only(),
        F::scalar("creationTimestamp").read_only(),
        F::scalar("deletionTimestamp").read_only(),
        F::scalar("selfLink").read_only(),
    ],
);

static ENV_VAR: TypeSchema = TypeSchema::new("EnvVar", &[]);
static CONTAINER_PORT: TypeSchema = TypeSchema::new("ContainerPort", &[]);
static VOLUME_MOUNT: TypeSchema = TypeSchema::new("VolumeMount", &[]);
static VOLUME_DEVICE: TypeSchema = TypeSchema::new("VolumeDevice", &[]);
static RESOURCES: TypeSchema = TypeSchema::new("ResourceRequirements", &[F::map("limits"), F::map("requests")]);

pub static CONTAINER: TypeSchema = TypeSchema::new(
    "Container",
    &[
        F::keyed("env", "name", &ENV_VAR),
        F::replace_list("envFrom"),
        F::keyed("ports", "containerPort", &CONTAINER_PORT),
        F::keyed("volumeMounts", "mountPath", &VOLUME_MOUNT),
        F::keyed("volumeDevices", "devicePath", &VOLUME_DEVICE),
        F::object("resources", &RESOURCES),
        F::replace_list("command"),
        F::replace_list("args"),
    ],
);

static VOLUME: TypeSchema = TypeSchema::new("Volume", &[]);
static LOCAL_REF: TypeSchema = TypeSchema::new("LocalObjectReference", &[]);
static HOST_ALIAS: TypeSchema = TypeSchema::new("HostAlias", &[F::replace_list("hostnames")]);
static TOPOLOGY_SPREAD: TypeSchema = TypeSchema::new("TopologySpreadConstraint", &[]);
static SCHEDULING_GATE: TypeSchema = TypeSchema::new("PodSchedulingGate", &[]);
static POD_RESOURCE_CLAIM: TypeSchema = TypeSchema::new("PodResourceClaim", &[]);

pub static POD_SPEC: TypeSchema = TypeSchema::new(
    "PodSpec",
    &[
        F::keyed("containers", "name", &CONTAINER),
        F::keyed("initContainers", "name", &CONTAINER),
        F::keyed("ephemeralContainers", "name", &CONTAINER),
        F::keyed("volumes", "name", &VOLUME),
        F::keyed("imagePullSecrets", "name", &LOCAL_REF),
        F::keyed("hostAliases", "ip", &HOST_ALIAS),
        F::replace_list("tolerations"),
        F::keyed("topologySpreadConstraints", "topologyKey", &TOPOLOGY_SPREAD),
        F::keyed("schedulingGates", "name", &SCHEDULING_GATE),
        F::keyed("resourceClaims", "name", &POD_RESOURCE_CLAIM),
        F::map("nodeSelector"),
        F::map("overhead"),
    ],
);

static CONDITION: TypeSchema = TypeSchema::new("Condition", &[]);
static CONTAINER_STATUS: TypeSchema = TypeSchema::new("ContainerStatus", &[]);

pub static POD_STATUS: TypeSchema = TypeSchema::new(
    "PodStatus",
    &[
        F::keyed("conditions", "type", &CONDITION),
        F::keyed("containerStatuses", "name", &CONTAINER_STATUS),
        F::keyed("initContainerStatuses", "name", &CONTAINER_STATUS),
        F::keyed("podIPs", "ip", &UNTYPED_ITEM),
    ],
);

static UNTYPED_ITEM: TypeSchema = TypeSchema::new("item", &[]);

pub static POD_TEMPLATE_SPEC: TypeSchema =
    TypeSchema::new("PodTemplateSpec", &[F::object("metadata", &OBJECT_META), F::object("spec", &POD_SPEC)]);

/// Generic workload status: conditions merged by type.
static WORKLOAD_STATUS: TypeSchema = TypeSchema::new("WorkloadStatus", &[F::keyed("conditions", "type", &CONDITION)]);

static LABEL_SELECTOR: TypeSchema =
    TypeSchema::new("LabelSelector", &[F::map("matchLabels"), F::replace_list("matchExpressions")]);

static WORKLOAD_SPEC: TypeSchema = TypeSchema::new(
    "WorkloadSpec",
    &[F::object("template", &POD_TEMPLATE_SPEC), F::object("selector", &LABEL_SELECTOR)],
);

static STATEFUL_SET_SPEC: TypeSchema = TypeSchema::new(
    "StatefulSetSpec",
    &[
        F::object("template", &POD_TEMPLATE_SPEC),
        F::object("selector", &LABEL_SELECTOR),
        F::replace_list("volumeClaimTemplates"),
    ],
);

static JOB_SPEC: TypeSchema = TypeSchema::new("JobSpec", &[F::object("template", &POD_TEMPLATE_SPEC)]);
static JOB_TEMPLATE_SPEC: TypeSchema =
    TypeSchema::new("JobTemplateSpec", &[F::object("metadata", &OBJECT_META), F::object("spec", &JOB_SPEC)]);
static CRON_JOB_SPEC: TypeSchema = TypeSchema::new("CronJobSpec", &[F::object("jobTemplate", &JOB_TEMPLATE_SPEC)]);

pub static POD: TypeSchema = TypeSchema::root(
    "Pod",
    &[F::object("metadata", &OBJECT_META), F::object("spec", &POD_SPEC), F::object("status", &POD_STATUS).read_only()],
);

pub static DEPLOYMENT: TypeSchema = TypeSchema::root(
    "Deployment",
    &[
        F::object("metadata", &OBJECT_META),
        F::object("spec", &WORKLOAD_SPEC),
        F::object("status", &WORKLOAD_STATUS).read_only(),
    ],
);

pub static STATEFUL_SET: TypeSchema = TypeSchema::root(
    "StatefulSet",
    &[
        F::object("metadata", &OBJECT_META),
        F::object("spec", &STATEFUL_SET_SPEC),
        F::object("status", &WORKLOAD_STATUS).read_only(),
    ],
);

pub static DAEMON_SET: TypeSchema = TypeSchema::root(
    "DaemonSet",
    &[
        F::object("metadata", &OBJECT_META),
        F::object("spec", &WORKLOAD_SPEC),
        F::object("status", &WORKLOAD_STATUS).read_only(),
    ],
);

pub static REPLICA_SET: TypeSchema = TypeSchema::root(
    "ReplicaSet",
    &[
        F::object("metadata", &OBJECT_META),
        F::object("spec", &WORKLOAD_SPEC),
        F::object("status", &WORKLOAD_STATUS).read_only(),
    ],
);

pub static JOB: TypeSchema = TypeSchema::root(
    "Job",
    &[F::object("metadata", &OBJECT_META), F::object("spec", &JOB_SPEC), F::object("status", &WORKLOAD_STATUS).read_only()],
);

pub static CRON_JOB: TypeSchema = TypeSchema::root(
    "CronJob",
    &[
        F::object("metadata", &OBJECT_META),
        F::object("spec", &CRON_JOB_SPEC),
        F::object("status", &WORKLOAD_STATUS).read_only(),
    ],
);

static SERVICE_PORT: TypeSchema = TypeSchema::new("ServicePort", &[]);
static SERVICE_SPEC: TypeSchema = TypeSchema::new(
    "ServiceSpec",
    &[F::keyed("ports", "port", &SERVICE_PORT), F::map("selector"), F::replace_list("externalIPs")],
);

pub static SERVICE: TypeSchema = TypeSchema::root(
    "Service",
    &[
        F::object("metadata", &OBJECT_META),
        F::object("spec", &SERVICE_SPEC),
        F::object("status", &WORKLOAD_STATUS).read_only(),
    ],
);

static NODE_SPEC: TypeSchema = TypeSchema::new("NodeSpec", &[F::replace_list("taints"), F::set_list("podCIDRs")]);
static NODE_STATUS: TypeSchema = TypeSchema::new(
    "NodeStatus",
    &[
        F::keyed("conditions", "type", &CONDITION),
        F::keyed("addresses", "type", &UNTYPED_ITEM),
        F::map("capacity"),
        F::map("allocatable"),
    ],
);

pub static NODE: TypeSchema = TypeSchema::root(
    "Node",
    &[F::object("metadata", &OBJECT_META), F::object("spec", &NODE_SPEC), F::object("status", &NODE_STATUS).read_only()],
);

pub static CONFIG_MAP: TypeSchema =
    TypeSchema::root("ConfigMap", &[F::object("metadata", &OBJECT_META), F::map("data"), F::map("binaryData")]);

pub static SECRET: TypeSchema = TypeSchema::root(
    "Secret",
    &[F::object("metadata", &OBJECT_META), F::map("data"), F::map("stringData")],
);

static NAMESPACE_SPEC: TypeSchema = TypeSchema::new("NamespaceSpec", &[F::replace_list("finalizers")]);

pub static NAMESPACE: TypeSchema = TypeSchema::root(
    "Namespace",
    &[
        F::object("metadata", &OBJECT_META),
        F::object("spec", &NAMESPACE_SPEC),
        F::object("status", &WORKLOAD_STATUS).read_only(),
    ],
);

/// `group/version/Kind` key to root schema.
pub static BUILTIN_SCHEMAS: &[(&str, &TypeSchema)] = &[
    ("v1/Pod", &POD),
    ("v1/Service", &SERVICE),
    ("v1/Node", &NODE),
    ("v1/ConfigMap", &CONFIG_MAP),
    ("v1/Secret", &SECRET),
    ("v1/Namespace", &NAMESPACE),
    ("apps/v1/Deployment", &DEPLOYMENT),
    ("apps/v1/StatefulSet", &STATEFUL_SET),
    ("apps/v1/DaemonSet", &DAEMON_SET),
    ("apps/v1/ReplicaSet", &REPLICA_SET),
    ("batch/v1/Job", &JOB),
    ("batch/v1/CronJob", &CRON_JOB),
];
