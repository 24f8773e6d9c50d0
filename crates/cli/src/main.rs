use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use kubeline_client::{KubeClient, ListOptions, LogOptions, Patch, RawObject, TypedClient, WatchEventType, WriteOptions};
use kubeline_core::{PathParams, Verb, UNTYPED};
use kubeline_patch::{compute_patch, manifest, PatchDocument};
use kubeline_registry::{resolve_path, Registry};
use serde_json::Value as Json;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kubelinectl", version, about = "Kubeline CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace (default: KUBELINE_NAMESPACE or "default")
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    /// List across all namespaces
    #[arg(short = 'A', long = "all-namespaces", global = true, action = ArgAction::SetTrue)]
    all_namespaces: bool,

    /// Extend the built-in kinds with the server's discovery documents (CRDs)
    #[arg(long = "discover", global = true, action = ArgAction::SetTrue)]
    discover: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the built-in resource kinds
    Kinds,
    /// Resolve the REST path for a kind and verb (offline)
    Path {
        /// GVK key, e.g. "v1/Pod" or "apps/v1/Deployment"
        gvk: String,
        /// Verb, e.g. get, list, watch-all-namespaces, patch-status
        verb: String,
        /// Object name for singular verbs
        name: Option<String>,
    },
    /// Fetch one object
    Get { gvk: String, name: String },
    /// List objects (all pages)
    Ls {
        gvk: String,
        /// Label selector
        #[arg(short = 'l', long = "selector")]
        selector: Option<String>,
    },
    /// Follow a list-watch subscription and print +/~/- events
    Watch {
        gvk: String,
        #[arg(short = 'l', long = "selector")]
        selector: Option<String>,
    },
    /// Show the patch that would move live objects to a manifest
    Diff {
        /// YAML manifest (may hold several documents)
        file: PathBuf,
        /// Diff against another manifest instead of the cluster
        #[arg(long = "against")]
        against: Option<PathBuf>,
    },
    /// Print (or follow) a pod's container logs
    Logs {
        pod: String,
        #[arg(short = 'c', long = "container")]
        container: Option<String>,
        #[arg(short = 'f', long = "follow", action = ArgAction::SetTrue)]
        follow: bool,
        #[arg(long = "tail")]
        tail: Option<i64>,
        #[arg(long = "since")]
        since_seconds: Option<i64>,
    },
    /// Create or patch objects from a manifest
    Apply {
        file: PathBuf,
        #[arg(long = "dry-run", action = ArgAction::SetTrue)]
        dry_run: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("KUBELINE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KUBELINE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid KUBELINE_METRICS_ADDR; expected host:port");
        }
    }
}

fn parse_verb(s: &str) -> Result<Verb> {
    Verb::ALL
        .iter()
        .copied()
        .find(|v| v.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| anyhow!("unknown verb '{}' (one of: {})", s, Verb::ALL.map(|v| v.as_str()).join(", ")))
}

fn json_key(v: &Json) -> String {
    let meta = v.get("metadata");
    let name = meta.and_then(|m| m.get("name")).and_then(|v| v.as_str()).unwrap_or("");
    match meta.and_then(|m| m.get("namespace")).and_then(|v| v.as_str()) {
        Some(ns) => format!("{}/{}", ns, name),
        None => name.to_string(),
    }
}

struct Ctx {
    output: Output,
    namespace: Option<String>,
    all_namespaces: bool,
    discover: bool,
}

impl Ctx {
    async fn client(&self) -> Result<KubeClient> {
        let kc = KubeClient::try_default().await?;
        if !self.discover {
            return Ok(kc);
        }
        kc.discover().await.context("discovering server kinds")
    }

    /// Namespace for a dynamic client: `None` when listing everywhere.
    fn scope(&self, client: &KubeClient) -> Option<String> {
        if self.all_namespaces {
            return None;
        }
        Some(self.namespace.clone().unwrap_or_else(|| client.config().default_namespace.clone()))
    }

    fn print_json<T: serde::Serialize>(&self, v: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(v)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let ctx = Ctx { output: cli.output, namespace: cli.namespace, all_namespaces: cli.all_namespaces, discover: cli.discover };

    match cli.command {
        Commands::Kinds => kinds(&ctx).await,
        Commands::Path { gvk, verb, name } => path(&ctx, &gvk, &verb, name.as_deref()),
        Commands::Get { gvk, name } => {
            let kc = ctx.client().await?;
            let api = kc.dynamic(&gvk, ctx.scope(&kc).as_deref())?;
            let obj = api.get(&name).await.with_context(|| format!("get {} {}", gvk, name))?;
            ctx.print_json(&obj)
        }
        Commands::Ls { gvk, selector } => ls(&ctx, &gvk, selector).await,
        Commands::Watch { gvk, selector } => watch(&ctx, &gvk, selector).await,
        Commands::Diff { file, against } => diff(&ctx, &file, against.as_deref()).await,
        Commands::Logs { pod, container, follow, tail, since_seconds } => {
            let opts = LogOptions { container, follow, tail_lines: tail, since_seconds, ..LogOptions::default() };
            logs(&ctx, &pod, opts).await
        }
        Commands::Apply { file, dry_run } => apply(&ctx, &file, dry_run).await,
    }
}

async fn kinds(ctx: &Ctx) -> Result<()> {
    let registry = if ctx.discover { ctx.client().await?.registry().clone() } else { Registry::builtin() };
    let kinds = registry.kinds();
    match ctx.output {
        Output::Human => {
            println!("{:<48} {:<32} {:<10} VERBS", "KIND", "PLURAL", "SCOPE");
            for d in kinds {
                let scope = if d.namespaced { "namespaced" } else { "cluster" };
                let verbs: Vec<_> = d.verbs().map(|v| v.as_str()).collect();
                println!("{:<48} {:<32} {:<10} {}", d.gvk.key(), d.plural, scope, verbs.join(","));
            }
            Ok(())
        }
        Output::Json => {
            let rows: Vec<_> = kinds.iter().map(|d| d.as_ref()).collect();
            ctx.print_json(&rows)
        }
    }
}

fn path(ctx: &Ctx, gvk: &str, verb: &str, name: Option<&str>) -> Result<()> {
    let registry = Registry::builtin();
    let descriptor = registry.describe_key(gvk)?;
    let verb = parse_verb(verb)?;
    let mut params = PathParams::new();
    if let Some(ns) = &ctx.namespace {
        params.set("namespace", ns.as_str());
    }
    if let Some(n) = name {
        params.set("name", n);
    }
    let resolved = resolve_path(&descriptor, verb, &params)?;
    println!("{} {}", verb.method(), resolved);
    Ok(())
}

async fn ls(ctx: &Ctx, gvk: &str, selector: Option<String>) -> Result<()> {
    let kc = ctx.client().await?;
    let api = kc.dynamic(gvk, ctx.scope(&kc).as_deref())?;
    info!(gvk = %gvk, ns = ?api.namespace(), "ls invoked");
    let opts = ListOptions { label_selector: selector, ..ListOptions::default() };
    let page = api.list_all(&opts).await.with_context(|| format!("list {}", gvk))?;
    match ctx.output {
        Output::Human => {
            println!("{:<20} {:<40} RESOURCEVERSION", "NAMESPACE", "NAME");
            for RawObject(item) in &page.items {
                let meta = item.get("metadata");
                let field = |k: &str| meta.and_then(|m| m.get(k)).and_then(|v| v.as_str()).unwrap_or("-").to_string();
                println!("{:<20} {:<40} {}", field("namespace"), field("name"), field("resourceVersion"));
            }
            Ok(())
        }
        Output::Json => ctx.print_json(&page.items),
    }
}

async fn watch(ctx: &Ctx, gvk: &str, selector: Option<String>) -> Result<()> {
    let kc = ctx.client().await?;
    let api = kc.dynamic(gvk, ctx.scope(&kc).as_deref())?;
    info!(gvk = %gvk, ns = ?api.namespace(), "watch invoked");
    let opts = ListOptions { label_selector: selector, ..ListOptions::default() };
    let mut sub = api.subscribe(opts).await.with_context(|| format!("subscribe {}", gvk))?;
    loop {
        tokio::select! {
            next = sub.next() => {
                let Some(item) = next else {
                    warn!("subscription ended");
                    break;
                };
                let ev = item.with_context(|| format!("watch {}", gvk))?;
                if ctx.output == Output::Json {
                    let row = serde_json::json!({ "type": ev.event_type, "resourceVersion": ev.resource_version, "object": ev.object });
                    println!("{}", row);
                    continue;
                }
                let key = ev.object.as_ref().map(|RawObject(o)| json_key(o)).unwrap_or_default();
                match ev.event_type {
                    WatchEventType::Added => println!("+ {}", key),
                    WatchEventType::Modified => println!("~ {}", key),
                    WatchEventType::Deleted => println!("- {}", key),
                    WatchEventType::Bookmark | WatchEventType::Error => {}
                }
            }
            _ = signal::ctrl_c() => {
                info!("Ctrl-C received; cancelling subscription");
                sub.cancel();
                break;
            }
        }
    }
    Ok(())
}

async fn logs(ctx: &Ctx, pod: &str, opts: LogOptions) -> Result<()> {
    let kc = ctx.client().await?;
    let ns = ctx.namespace.clone().unwrap_or_else(|| kc.config().default_namespace.clone());
    let pods = kc.dynamic("v1/Pod", Some(&ns))?;
    if !opts.follow {
        let text = pods.logs(pod, &opts).await.with_context(|| format!("logs {}/{}", ns, pod))?;
        print!("{}", text);
        return Ok(());
    }
    let mut lines = pods.log_lines(pod, &opts).await.with_context(|| format!("logs {}/{}", ns, pod))?;
    loop {
        tokio::select! {
            next = lines.next() => match next {
                Some(line) => println!("{}", line.with_context(|| format!("logs {}/{}", ns, pod))?),
                None => break,
            },
            _ = signal::ctrl_c() => {
                info!("Ctrl-C received; closing log stream");
                break;
            }
        }
    }
    Ok(())
}

fn read_manifests(file: &std::path::Path) -> Result<Vec<Json>> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let docs = manifest::from_yaml_all(&text).with_context(|| format!("parsing {}", file.display()))?;
    if docs.is_empty() {
        return Err(anyhow!("{}: no documents", file.display()));
    }
    Ok(docs)
}

/// Client for the object a manifest addresses, plus the merge schema for its kind.
fn target_client(
    kc: &KubeClient,
    ctx: &Ctx,
    doc: &Json,
) -> Result<(TypedClient<RawObject>, String, &'static kubeline_core::TypeSchema)> {
    let target = manifest::target(doc, ctx.namespace.as_deref())?;
    let descriptor = kc.registry().describe(&target.gvk)?;
    let ns = target.namespace.unwrap_or_else(|| kc.config().default_namespace.clone());
    let schema = kc.registry().schema_for(&target.gvk).unwrap_or(&UNTYPED);
    Ok((kc.for_descriptor(descriptor, Some(ns)), target.name, schema))
}

fn print_patch(ctx: &Ctx, label: &str, doc: &PatchDocument) -> Result<()> {
    let s = doc.summary();
    match ctx.output {
        Output::Human => {
            println!("{}: +{} ~{} -{}", label, s.adds, s.updates, s.removes);
            for op in doc {
                println!("  {}", serde_json::to_string(op)?);
            }
            Ok(())
        }
        Output::Json => {
            let row = serde_json::json!({ "target": label, "summary": s, "ops": doc.ops(), "strategic": doc.to_strategic_merge() });
            ctx.print_json(&row)
        }
    }
}

async fn diff(ctx: &Ctx, file: &std::path::Path, against: Option<&std::path::Path>) -> Result<()> {
    let desired = read_manifests(file)?;
    if let Some(base) = against {
        let base = read_manifests(base)?;
        let registry = Registry::builtin();
        for (old, new) in base.iter().zip(desired.iter()) {
            let target = manifest::target(new, ctx.namespace.as_deref())?;
            let schema = registry.schema_for(&target.gvk).unwrap_or(&UNTYPED);
            let doc = compute_patch(old, new, schema).with_context(|| format!("diffing {}", target.name))?;
            print_patch(ctx, &format!("{}/{}", target.gvk, target.name), &doc)?;
        }
        return Ok(());
    }
    let kc = ctx.client().await?;
    for new in &desired {
        let (api, name, schema) = target_client(&kc, ctx, new)?;
        let label = format!("{}/{}", api.descriptor().gvk, name);
        match api.get_opt(&name).await.with_context(|| format!("get {}", label))? {
            Some(RawObject(live)) => {
                let doc = compute_patch(&live, new, schema).with_context(|| format!("diffing {}", label))?;
                print_patch(ctx, &label, &doc)?;
            }
            None => println!("{}: would be created", label),
        }
    }
    Ok(())
}

async fn apply(ctx: &Ctx, file: &std::path::Path, dry_run: bool) -> Result<()> {
    let desired = read_manifests(file)?;
    let kc = ctx.client().await?;
    let wo = WriteOptions { dry_run, field_manager: Some("kubelinectl".to_string()) };
    for new in desired {
        let (api, name, schema) = target_client(&kc, ctx, &new)?;
        let label = format!("{}/{}", api.descriptor().gvk, name);
        let live = api.get_opt(&name).await.with_context(|| format!("get {}", label))?;
        let Some(RawObject(live)) = live else {
            api.create(&RawObject(new), &wo).await.with_context(|| format!("create {}", label))?;
            println!("{} created{}", label, if dry_run { " (dry run)" } else { "" });
            continue;
        };
        let doc = compute_patch(&live, &new, schema).with_context(|| format!("diffing {}", label))?;
        if doc.is_empty() {
            println!("{} unchanged", label);
            continue;
        }
        // custom kinds have no strategic-merge metadata on the server
        let patch = if std::ptr::eq(schema, &UNTYPED) { Patch::json_from(&doc, &live)? } else { Patch::Strategic(doc.clone()) };
        api.patch(&name, &patch, &wo).await.with_context(|| format!("patch {}", label))?;
        let s = doc.summary();
        println!("{} patched (+{} ~{} -{}){}", label, s.adds, s.updates, s.removes, if dry_run { " (dry run)" } else { "" });
    }
    Ok(())
}
