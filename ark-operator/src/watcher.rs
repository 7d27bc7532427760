//! Configuration watcher (§4.11): watches for changes to the global-envs
//! ConfigMap and per-map Secrets, debounces rapid edits, and triggers a
//! restart for the maps actually affected.

use std::collections::BTreeSet;
use std::time::Duration;

use ark_types::ArkCluster;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api, Client, ResourceExt,
};
use owo_colors::OwoColorize;

use crate::rcon::RconPool;
use crate::restart::coordinate_restart;
use crate::util::{colors::FG1, Error};

/// How long to wait after a change before acting, so a burst of edits
/// (e.g. `kubectl edit` saving several times) only triggers one restart.
const DEBOUNCE: Duration = Duration::from_secs(5);

/// Runs the configmap/secret watch loop until cancelled. Every observed
/// change is matched by name against `<cluster>-global-envs` or
/// `<cluster>-<map>-envs`; only clusters with an affected map are
/// restarted.
pub async fn run(client: Client, clusters: Api<ArkCluster>) -> Result<(), Error> {
    let configmaps: Api<ConfigMap> = Api::all(client.clone());
    let rcon = RconPool::new();

    let mut stream = watcher(configmaps, watcher::Config::default()).applied_objects().boxed();
    let mut pending: BTreeSet<String> = BTreeSet::new();

    loop {
        let next = tokio::time::timeout(DEBOUNCE, stream.next()).await;
        match next {
            Ok(Some(Ok(cm))) => {
                pending.insert(cm.name_any());
                continue;
            }
            Ok(Some(Err(err))) => {
                eprintln!("{}", format!("configmap watch error: {err}").color(FG1));
                continue;
            }
            Ok(None) => break,
            Err(_) => {
                // Debounce window elapsed with no new events: act on whatever
                // accumulated, then keep watching.
            }
        }

        if pending.is_empty() {
            continue;
        }
        let changed = std::mem::take(&mut pending);
        for cluster in clusters.list(&Default::default()).await?.items {
            if affects_cluster(&cluster, &changed) {
                let _ = coordinate_restart(client.clone(), &cluster, &rcon, "configuration changed", false).await;
            }
        }
    }
    Ok(())
}

fn affects_cluster(cluster: &ArkCluster, changed_names: &BTreeSet<String>) -> bool {
    let global_name = format!("{}-global-envs", cluster.name_any());
    if changed_names.contains(&global_name) {
        return true;
    }
    changed_names
        .iter()
        .any(|name| name.starts_with(&format!("{}-", cluster.name_any())) && name.ends_with("-envs"))
}
