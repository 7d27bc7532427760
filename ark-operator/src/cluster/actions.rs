use std::collections::BTreeMap;

use ark_types::{ActiveVolume, ArkCluster, ClusterStage};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret};
use kube::{Client, ResourceExt};

use crate::client;
use crate::config::{self, compose_env, EnvCache};
use crate::maps::{self, expand_selector};
use crate::rcon::RconPool;
use crate::resources::{self, MIN_DATA_SIZE, MIN_SERVER_SIZE};
use crate::restart;
use crate::util::{messages, patch::patch_status, Error};

/// Reads the cluster's generated RCON password from `{cluster}-cluster-secrets`,
/// creating the Secret with a fresh random password if it doesn't exist yet
/// (§4.6/§6: the CREATE stage owns this Secret and never rotates it).
pub(crate) async fn ensure_cluster_secret(client: Client, namespace: &str, instance: &ArkCluster) -> Result<String, Error> {
    let name = resources::cluster_secret_name(instance);
    if let Some(secret) = client::get_opt::<Secret>(client.clone(), namespace, &name).await? {
        if let Some(password) = secret
            .data
            .as_ref()
            .and_then(|d| d.get(resources::RCON_PASSWORD_ENV_KEY))
            .map(|b| String::from_utf8_lossy(&b.0).to_string())
        {
            return Ok(password);
        }
    }

    let password = resources::generate_rcon_password();
    let secret = resources::cluster_secret(instance, &password);
    client::apply(client, namespace, &secret).await?;
    Ok(password)
}

fn pvc_bound(pvc: &PersistentVolumeClaim) -> bool {
    pvc.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == "Bound")
}

/// Ensures both server-a/server-b volumes exist, marking the `ServerPvc`
/// stage complete once they're bound.
pub async fn create_server_pvcs(client: Client, instance: &ArkCluster) -> Result<(), Error> {
    let namespace = instance.namespace().expect("namespaced resource");
    let spec = &instance.spec.server;
    resources::validate_pvc_size("server", &spec.size, MIN_SERVER_SIZE, None)?;

    let mut all_bound = true;
    for volume in [ActiveVolume::ServerA, ActiveVolume::ServerB] {
        let name = resources::server_pvc_name(instance, volume);
        match client::get_opt::<PersistentVolumeClaim>(client.clone(), &namespace, &name).await? {
            Some(existing) if pvc_bound(&existing) => {}
            Some(_) => all_bound = false,
            None => {
                let pvc = resources::server_pvc(instance, spec, volume);
                client::apply(client.clone(), &namespace, &pvc).await?;
                all_bound = false;
            }
        }
    }

    if all_bound {
        patch_status(client, instance, |status: &mut ark_types::ArkClusterStatus| {
            status.mark_stage_complete(ClusterStage::ServerPvc);
        })
        .await?;
    }
    Ok(())
}

/// Ensures the shared data volume exists, marking `DataPvc` complete once
/// bound.
pub async fn create_data_pvc(client: Client, instance: &ArkCluster) -> Result<(), Error> {
    let namespace = instance.namespace().expect("namespaced resource");
    let spec = &instance.spec.data;
    resources::validate_pvc_size("data", &spec.size, MIN_DATA_SIZE, None)?;

    let name = resources::data_pvc_name(instance);
    let bound = match client::get_opt::<PersistentVolumeClaim>(client.clone(), &namespace, &name).await? {
        Some(existing) => pvc_bound(&existing),
        None => {
            let pvc = resources::data_pvc(instance, spec);
            client::apply(client.clone(), &namespace, &pvc).await?;
            false
        }
    };

    if bound {
        patch_status(client, instance, |status: &mut ark_types::ArkClusterStatus| {
            status.mark_stage_complete(ClusterStage::DataPvc);
        })
        .await?;
    }
    Ok(())
}

/// Runs (or waits for) the one-shot volume-init Job, marking `InitPvc`
/// complete once it succeeds.
pub async fn run_init_job(client: Client, instance: &ArkCluster, job_name: &str) -> Result<(), Error> {
    use k8s_openapi::api::batch::v1::Job;
    let namespace = instance.namespace().expect("namespaced resource");

    let job = match client::get_opt::<Job>(client.clone(), &namespace, job_name).await? {
        Some(job) => job,
        None => {
            let job = resources::init_job(instance);
            client::apply(client.clone(), &namespace, &job).await?;
            return Ok(());
        }
    };

    let succeeded = job.status.as_ref().and_then(|s| s.succeeded).unwrap_or(0) > 0;
    if succeeded {
        patch_status(client, instance, |status: &mut ark_types::ArkClusterStatus| {
            status.mark_stage_complete(ClusterStage::InitPvc);
            status.active_volume = Some(ActiveVolume::ServerA);
        })
        .await?;
    }
    Ok(())
}

/// Creates the per-map Pods/Services for the first time. Port numbers are
/// assigned by each map's index within the ordered selector expansion.
pub async fn create_resources(client: Client, instance: &ArkCluster, env_cache: &EnvCache) -> Result<(), Error> {
    let namespace = instance.namespace().expect("namespaced resource");
    let active_volume = instance
        .status
        .as_ref()
        .and_then(|s| s.active_volume)
        .unwrap_or_default();
    let maps = expand_selector(&instance.spec.server.maps, None)?;

    let global_envs_name = format!("{}-global-envs", instance.name_any());
    let global_envs: BTreeMap<String, String> = {
        let client = client.clone();
        let namespace = namespace.clone();
        env_cache
            .get_or_fetch(|| async move { config::read_configmap_envs(client, &namespace, &global_envs_name).await })
            .await?
    };

    let rcon_password = ensure_cluster_secret(client.clone(), &namespace, instance).await?;

    for (index, map_id) in maps.iter().enumerate() {
        let game_port = (instance.spec.server.game_port_start + index as i32) as u16;
        let rcon_port = (instance.spec.server.rcon_port_start + index as i32) as u16;

        let map_envs_name = format!("{}-map-envs-{}", instance.name_any(), maps::get_map_slug(map_id));
        let map_envs = config::read_configmap_envs(client.clone(), &namespace, &map_envs_name).await?;

        let mut env = compose_env(&instance.spec, map_id, &global_envs, &map_envs);
        env.insert(resources::RCON_PASSWORD_ENV_KEY.to_string(), rcon_password.clone());

        let pod = resources::server_pod(instance, map_id, active_volume, game_port, rcon_port, &env);
        client::apply(client.clone(), &namespace, &pod).await?;

        let service = resources::server_service(instance, map_id, game_port, rcon_port);
        client::apply(client.clone(), &namespace, &service).await?;
    }

    patch_status(client, instance, |status: &mut ark_types::ArkClusterStatus| {
        status.mark_stage_complete(ClusterStage::Create);
        status.ready = true;
        status.state = "Running".to_string();
    })
    .await?;
    Ok(())
}

/// Stages a newer build onto the standby volume, waits for the update Job
/// to finish, then hands off to the restart coordinator to cut over.
pub async fn apply_update(
    client: Client,
    instance: &ArkCluster,
    job_name: Option<&str>,
    rcon: &RconPool,
) -> Result<(), Error> {
    use k8s_openapi::api::batch::v1::Job;
    let namespace = instance.namespace().expect("namespaced resource");
    let active = instance
        .status
        .as_ref()
        .and_then(|s| s.active_volume)
        .unwrap_or_default();
    let standby = active.other();

    let name = job_name
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-update-{}", instance.name_any(), standby.as_str()));

    let job = match client::get_opt::<Job>(client.clone(), &namespace, &name).await? {
        Some(job) => job,
        None => {
            let job = resources::update_job(instance, standby);
            client::apply(client.clone(), &namespace, &job).await?;
            return Ok(());
        }
    };

    let succeeded = job.status.as_ref().and_then(|s| s.succeeded).unwrap_or(0) > 0;
    if succeeded {
        restart::coordinate_restart(client.clone(), instance, rcon, "build update", false).await?;
        let latest = instance.status.as_ref().and_then(|s| s.latest_buildid);
        patch_status(client, instance, |status: &mut ark_types::ArkClusterStatus| {
            status.active_buildid = latest;
        })
        .await?;
    }
    Ok(())
}

/// Keeps `status.state`/`lastUpdate` fresh while the cluster is steady.
pub async fn mark_active(client: Client, instance: &ArkCluster) -> Result<(), Error> {
    patch_status(client, instance, |status: &mut ark_types::ArkClusterStatus| {
        if !status.is_error() {
            status.state = "Running".to_string();
            status.ready = true;
        }
    })
    .await?;
    let _ = messages::active("");
    Ok(())
}

/// Clears a terminal error once the user has changed the spec, re-arming
/// the stage machine from the beginning.
pub async fn clear_error(client: Client, instance: &ArkCluster) -> Result<(), Error> {
    patch_status(client, instance, |status: &mut ark_types::ArkClusterStatus| {
        status.state = "Initializing".to_string();
        status.ready = false;
        status.stages = None;
    })
    .await?;
    Ok(())
}

/// Records a permanent failure on `status.state`.
pub async fn set_error(client: Client, instance: &ArkCluster, message: String) -> Result<(), Error> {
    patch_status(client, instance, |status: &mut ark_types::ArkClusterStatus| {
        status.set_error(&message);
    })
    .await?;
    Ok(())
}
