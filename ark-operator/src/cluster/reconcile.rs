use std::sync::Arc;
use std::time::Duration;

use ark_types::{ArkCluster, ClusterStage};
use futures::stream::StreamExt;
use kube::{
    client::Client,
    runtime::{controller::Action, Controller},
    Api, ResourceExt,
};
use owo_colors::OwoColorize;

use super::actions;
use crate::build;
use crate::config::EnvCache;
use crate::rcon::RconPool;
use crate::util::{
    colors::{FG1, FG2},
    hash_spec,
    patch::patch_status,
    Error, BUILD_CHECK_INTERVAL, PROBE_INTERVAL,
};

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

/// Entrypoint for the `ArkCluster` controller.
pub async fn run(client: Client) -> Result<(), Error> {
    println!("{}", "Starting ArkCluster controller...".green());

    let api: Api<ArkCluster> = Api::all(client.clone());
    let context: Arc<ContextData> = Arc::new(ContextData::new(client.clone()));

    ark_common::signal_ready();

    Controller::new(api, Default::default())
        .run(reconcile, on_error, context)
        .for_each(|_result| async move {})
        .await;
    Ok(())
}

struct ContextData {
    client: Client,
    rcon: RconPool,
    env_cache: EnvCache,
    http: reqwest::Client,

    #[cfg(feature = "metrics")]
    metrics: ControllerMetrics,
}

impl ContextData {
    fn new(client: Client) -> Self {
        ContextData {
            client,
            rcon: RconPool::new(),
            env_cache: EnvCache::default(),
            http: reqwest::Client::new(),
            #[cfg(feature = "metrics")]
            metrics: ControllerMetrics::new(),
        }
    }
}

/// Action to take on an `ArkCluster` during one reconcile pass (§4.9).
#[derive(Debug, PartialEq)]
enum ClusterAction {
    /// Provision the two server-a/server-b volumes.
    CreateServerPvcs,
    /// Provision the shared data volume.
    CreateDataPvc,
    /// Run the one-shot volume-init Job.
    RunInitJob { job_name: String },
    /// Create the per-map Pods/Services for the first time.
    CreateResources,
    /// A newer build is available; stage it onto the standby volume and
    /// hand off to the restart coordinator.
    ApplyUpdate { job_name: Option<String> },
    /// Nothing changed; keep status fresh.
    Active,
    /// Resource is in the steady state and well within its probe window.
    NoOp,
    /// Spec changed while in a terminal error state; start over.
    Retry,
    /// Permanent failure.
    Error(String),
    /// Resource is being deleted.
    Delete,
}

impl ClusterAction {
    fn label(&self) -> &'static str {
        match self {
            ClusterAction::CreateServerPvcs => "CreateServerPvcs",
            ClusterAction::CreateDataPvc => "CreateDataPvc",
            ClusterAction::RunInitJob { .. } => "RunInitJob",
            ClusterAction::CreateResources => "CreateResources",
            ClusterAction::ApplyUpdate { .. } => "ApplyUpdate",
            ClusterAction::Active => "Active",
            ClusterAction::NoOp => "NoOp",
            ClusterAction::Retry => "Retry",
            ClusterAction::Error(_) => "Error",
            ClusterAction::Delete => "Delete",
        }
    }
}

async fn reconcile(instance: Arc<ArkCluster>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let namespace = instance.namespace().ok_or_else(|| {
        Error::UserInput("ArkCluster resources must be namespaced".to_string())
    })?;
    let name = instance.name_any();

    #[cfg(feature = "metrics")]
    context.metrics.reconciliations.with_label_values(&[&name]).inc();
    #[cfg(feature = "metrics")]
    let start = std::time::Instant::now();

    let action = determine_action(&namespace, &instance, client.clone(), &context.http).await?;

    if action != ClusterAction::NoOp {
        println!(
            "🗿 {}{}{}{}{}",
            namespace.color(FG2),
            "/".color(FG1),
            name.color(FG2),
            " ACTION: ".color(FG1),
            action.label().color(FG2),
        );
    }

    #[cfg(feature = "metrics")]
    context
        .metrics
        .reconcile_duration
        .with_label_values(&[&name])
        .observe(start.elapsed().as_secs_f64());
    #[cfg(feature = "metrics")]
    context.metrics.actions.with_label_values(&[&name, action.label()]).inc();

    let result = match action {
        ClusterAction::CreateServerPvcs => {
            actions::create_server_pvcs(client.clone(), &instance).await?;
            Action::requeue(Duration::from_secs(5))
        }
        ClusterAction::CreateDataPvc => {
            actions::create_data_pvc(client.clone(), &instance).await?;
            Action::requeue(Duration::from_secs(5))
        }
        ClusterAction::RunInitJob { job_name } => {
            actions::run_init_job(client.clone(), &instance, &job_name).await?;
            Action::requeue(Duration::from_secs(5))
        }
        ClusterAction::CreateResources => {
            actions::create_resources(client.clone(), &instance, &context.env_cache).await?;
            Action::requeue(Duration::from_secs(5))
        }
        ClusterAction::ApplyUpdate { job_name } => {
            actions::apply_update(client.clone(), &instance, job_name.as_deref(), &context.rcon).await?;
            Action::requeue(Duration::from_secs(5))
        }
        ClusterAction::Active => {
            actions::mark_active(client.clone(), &instance).await?;
            Action::requeue(PROBE_INTERVAL)
        }
        ClusterAction::Retry => {
            actions::clear_error(client.clone(), &instance).await?;
            Action::requeue(Duration::from_secs(5))
        }
        ClusterAction::Error(message) => {
            actions::set_error(client.clone(), &instance, message).await?;
            Action::requeue(PROBE_INTERVAL)
        }
        ClusterAction::Delete => {
            context.rcon.close_all().await;
            Action::await_change()
        }
        ClusterAction::NoOp => Action::requeue(PROBE_INTERVAL),
    };

    Ok(result)
}

/// Looks at an `ArkCluster`'s status and decides the single next action to
/// take, one stage at a time (§4.9). Stages are strictly ordered:
/// ServerPvc -> DataPvc -> InitPvc -> Create. Once all four are complete
/// the cluster is steady-state and only build-update checks move it.
async fn determine_action(
    namespace: &str,
    instance: &ArkCluster,
    client: Client,
    http: &reqwest::Client,
) -> Result<ClusterAction, Error> {
    if instance.metadata.deletion_timestamp.is_some() {
        return Ok(ClusterAction::Delete);
    }

    let status = instance.status.clone().unwrap_or_default();

    if status.is_error() {
        let current_hash = hash_spec(&instance.spec);
        let annotated_hash = instance
            .annotations()
            .get(ark_common::annotations::SPEC_HASH)
            .cloned();
        return if annotated_hash.as_deref() != Some(current_hash.as_str()) {
            Ok(ClusterAction::Retry)
        } else {
            Ok(ClusterAction::NoOp)
        };
    }

    if !status.is_stage_completed(ClusterStage::ServerPvc) {
        return Ok(ClusterAction::CreateServerPvcs);
    }
    if !status.is_stage_completed(ClusterStage::DataPvc) {
        return Ok(ClusterAction::CreateDataPvc);
    }
    if !status.is_stage_completed(ClusterStage::InitPvc) {
        let job_name = format!("{}-init", instance.name_any());
        return Ok(ClusterAction::RunInitJob { job_name });
    }
    if !status.is_stage_completed(ClusterStage::Create) {
        return Ok(ClusterAction::CreateResources);
    }

    // Steady state: a restart already in flight takes priority over a fresh
    // build check.
    if let Some(restart) = &status.restart {
        let _ = restart;
        return Ok(ClusterAction::NoOp);
    }

    let due = status
        .last_build_check
        .as_deref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|checked_at| {
            let elapsed = chrono::Utc::now().signed_duration_since(checked_at);
            elapsed >= chrono::Duration::from_std(BUILD_CHECK_INTERVAL).unwrap_or_default()
        })
        .unwrap_or(true);

    if due {
        let latest = build::latest_buildid(http).await?;
        patch_status(client, instance, |s: &mut ark_types::ArkClusterStatus| {
            s.latest_buildid = Some(latest);
            s.last_build_check = Some(chrono::Utc::now().to_rfc3339());
        })
        .await?;

        if build::is_update_available(status.active_buildid, latest) {
            return Ok(ClusterAction::ApplyUpdate { job_name: None });
        }
    }

    let _ = namespace;
    Ok(ClusterAction::Active)
}

fn on_error(instance: Arc<ArkCluster>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!("Reconciliation error for {}: {error:?}", instance.name_any()).red()
    );
    match error.retry_delay() {
        Some(delay) => Action::requeue(delay),
        None => Action::requeue(Duration::from_secs(30)),
    }
}
