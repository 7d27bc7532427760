//! Restart coordinator (§4.10): announces an upcoming restart over RCON on
//! an announce ladder, saves the world, waits for the pod to terminate,
//! then recreates it pointed at the (possibly new) active volume.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ark_types::{ActiveVolume, ArkCluster, RestartStatus};
use k8s_openapi::api::core::v1::Pod;
use kube::{Client, ResourceExt};
use tokio::sync::Mutex;

use crate::client;
use crate::cluster::actions::ensure_cluster_secret;
use crate::config::{self, compose_env};
use crate::maps::{self, expand_selector};
use crate::rcon::RconPool;
use crate::resources::{self, pod_name};
use crate::util::patch::patch_status;
use crate::util::{messages, Error};

/// Minutes-before-restart at which an announcement is sent, in order.
const ANNOUNCE_LADDER: &[u64] = &[60, 30, 15, 5, 1];

lazy_static::lazy_static! {
    /// Per-cluster locks so two concurrent reconciles never start two
    /// restarts on the same cluster at once. Keyed by `namespace/name`.
    static ref IN_PROGRESS: Mutex<BTreeMap<String, Arc<Mutex<()>>>> = Mutex::new(BTreeMap::new());
}

async fn lock_for(key: &str) -> Arc<Mutex<()>> {
    let mut locks = IN_PROGRESS.lock().await;
    locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
}

/// Runs the full announce-save-wait-recreate sequence for every map pod in
/// the cluster. `force` skips the announce ladder entirely for an
/// operator-initiated immediate restart (`ark-operator restart --force`).
///
/// Non-blocking: if a restart is already in progress for this cluster,
/// returns immediately rather than queueing a second one (§4.10).
pub async fn coordinate_restart(
    client: Client,
    instance: &ArkCluster,
    rcon: &RconPool,
    reason: &str,
    force: bool,
) -> Result<(), Error> {
    let key = format!("{}/{}", instance.namespace().unwrap_or_default(), instance.name_any());
    let lock = lock_for(&key).await;
    let Ok(_guard) = lock.try_lock() else {
        return Ok(());
    };

    let namespace = instance.namespace().expect("namespaced resource");
    let active = instance
        .status
        .as_ref()
        .and_then(|s| s.active_volume)
        .unwrap_or_default();
    let next_volume = active.other();

    patch_status(client.clone(), instance, |status: &mut ark_types::ArkClusterStatus| {
        status.restart = Some(RestartStatus {
            reason: reason.to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            active_volume: next_volume,
        });
    })
    .await?;

    let maps = expand_selector(&instance.spec.server.maps, None)?;
    let rcon_password = ensure_cluster_secret(client.clone(), &namespace, instance).await?;
    let targets: Vec<(String, u16, String)> = maps
        .iter()
        .enumerate()
        .map(|(index, _map_id)| {
            let host = pod_name(instance, &maps[index]);
            let port = (instance.spec.server.rcon_port_start + index as i32) as u16;
            (host, port, rcon_password.clone())
        })
        .collect();

    if !force {
        let mut previous_minutes = 0u64;
        for minutes in ANNOUNCE_LADDER {
            let message = format!("ServerChat Restarting in {minutes} minutes: {reason}");
            let _ = rcon.send_all(&targets, &message).await;
            tokio::time::sleep(Duration::from_secs(minutes * 60 - previous_minutes * 60)).await;
            previous_minutes = *minutes;
        }
    }

    for (host, port, password) in &targets {
        let _ = rcon.send(host, *port, password, "SaveWorld").await;
        let _ = rcon.send(host, *port, password, "DoExit").await;
    }

    for map_id in &maps {
        let name = pod_name(instance, map_id);
        client::delete::<Pod>(client.clone(), &namespace, &name).await?;
    }

    wait_for_pods_gone(client.clone(), &namespace, instance, &maps).await;

    recreate_pods(client.clone(), instance, next_volume).await?;

    patch_status(client.clone(), instance, |status: &mut ark_types::ArkClusterStatus| {
        status.restart = None;
        status.active_volume = Some(next_volume);
    })
    .await?;

    Ok(())
}

async fn wait_for_pods_gone(client: Client, namespace: &str, instance: &ArkCluster, maps: &[String]) {
    for _ in 0..30 {
        let mut any_present = false;
        for map_id in maps {
            let name = pod_name(instance, map_id);
            if client::get_opt::<Pod>(client.clone(), namespace, &name)
                .await
                .ok()
                .flatten()
                .is_some()
            {
                any_present = true;
            }
        }
        if !any_present {
            return;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

async fn recreate_pods(client: Client, instance: &ArkCluster, active_volume: ActiveVolume) -> Result<(), Error> {
    let namespace = instance.namespace().expect("namespaced resource");
    let maps = expand_selector(&instance.spec.server.maps, None)?;
    let suspended: std::collections::BTreeSet<&String> = instance.spec.server.suspend.iter().collect();

    let global_envs_name = format!("{}-global-envs", instance.name_any());
    let global_envs = config::read_configmap_envs(client.clone(), &namespace, &global_envs_name).await?;
    let rcon_password = ensure_cluster_secret(client.clone(), &namespace, instance).await?;

    for (index, map_id) in maps.iter().enumerate() {
        if suspended.contains(map_id) {
            continue;
        }
        let game_port = (instance.spec.server.game_port_start + index as i32) as u16;
        let rcon_port = (instance.spec.server.rcon_port_start + index as i32) as u16;

        let map_envs_name = format!("{}-map-envs-{}", instance.name_any(), maps::get_map_slug(map_id));
        let map_envs = config::read_configmap_envs(client.clone(), &namespace, &map_envs_name).await?;

        let mut env = compose_env(&instance.spec, map_id, &global_envs, &map_envs);
        env.insert(resources::RCON_PASSWORD_ENV_KEY.to_string(), rcon_password.clone());

        let pod = resources::server_pod(instance, map_id, active_volume, game_port, rcon_port, &env);
        client::apply(client.clone(), &namespace, &pod).await?;
    }
    let _ = messages::starting("");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_ladder_is_descending() {
        for pair in ANNOUNCE_LADDER.windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }
}
