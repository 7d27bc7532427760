//! Typed manifest builders for the resources an `ArkCluster` owns (§4.4,
//! §6.2): PVCs, the volume-init Job, the build-update Job, per-map server
//! Pods and their Services.

use std::collections::BTreeMap;

use ark_common::labels;
use ark_types::{ActiveVolume, ArkCluster, ArkDataSpec, ArkServerSpec};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource,
    Pod, PodSpec, PodTemplateSpec, ResourceRequirements, Secret, Service, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::ResourceExt;

use crate::size::parse_size;
use crate::util::Error;

/// Minimum size the server volume can be provisioned at; below this the
/// game server cannot install.
pub const MIN_SERVER_SIZE: &str = "50Gi";
/// Minimum size the shared data volume (saves, mods, configs) can be
/// provisioned at.
pub const MIN_DATA_SIZE: &str = "1Gi";

fn owner_reference(cluster: &ArkCluster) -> OwnerReference {
    OwnerReference {
        api_version: "mort.is/v1beta1".to_string(),
        kind: "ArkCluster".to_string(),
        name: cluster.name_any(),
        uid: cluster.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn base_labels(cluster: &ArkCluster, component: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert(labels::NAME.to_string(), cluster.name_any());
    map.insert(labels::INSTANCE.to_string(), cluster.name_any());
    map.insert(labels::PART_OF.to_string(), labels::PART_OF_VALUE.to_string());
    map.insert(labels::MANAGED_BY.to_string(), labels::MANAGED_BY_VALUE.to_string());
    map.insert(labels::COMPONENT.to_string(), component.to_string());
    map.insert(labels::VERSION.to_string(), ark_common::label_version());
    map
}

/// Rejects provisioning below `minimum`, or shrinking an already-bound PVC.
/// Shrinking a PVC in place isn't supported by most storage classes, so
/// that case is a permanent error rather than something to retry.
pub fn validate_pvc_size(
    what: &str,
    requested: &str,
    minimum: &str,
    current: Option<&str>,
) -> Result<(), Error> {
    let requested_bytes = parse_size(requested)?;
    let minimum_bytes = parse_size(minimum)?;
    if requested_bytes < minimum_bytes {
        return Err(Error::PvcTooSmall {
            what: what.to_string(),
            requested: requested.to_string(),
            minimum: minimum.to_string(),
        });
    }
    if let Some(current) = current {
        let current_bytes = parse_size(current)?;
        if requested_bytes < current_bytes {
            return Err(Error::PvcShrink {
                name: what.to_string(),
                current: current.to_string(),
                requested: requested.to_string(),
            });
        }
    }
    Ok(())
}

fn pvc(
    cluster: &ArkCluster,
    name: &str,
    component: &str,
    storage_class: Option<&str>,
    size: &str,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: cluster.namespace(),
            labels: Some(base_labels(cluster, component)),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: storage_class.map(str::to_string),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), Quantity(size.to_string()))])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Names the two server volumes used for the A/B build-swap rotation.
pub fn server_pvc_name(cluster: &ArkCluster, volume: ActiveVolume) -> String {
    format!("{}-server-{}", cluster.name_any(), volume.as_str())
}

pub fn data_pvc_name(cluster: &ArkCluster) -> String {
    format!("{}-data", cluster.name_any())
}

pub fn server_pvc(cluster: &ArkCluster, spec: &ArkServerSpec, volume: ActiveVolume) -> PersistentVolumeClaim {
    pvc(
        cluster,
        &server_pvc_name(cluster, volume),
        "server",
        spec.storage_class.as_deref(),
        &spec.size,
    )
}

pub fn data_pvc(cluster: &ArkCluster, spec: &ArkDataSpec) -> PersistentVolumeClaim {
    pvc(cluster, &data_pvc_name(cluster), "data", spec.storage_class.as_deref(), &spec.size)
}

/// Key under which the generated RCON password is stored in the cluster
/// secret (§4.8's `ARK_SERVER_*` env naming convention).
pub const RCON_PASSWORD_ENV_KEY: &str = "ARK_SERVER_RCON_PASSWORD";

pub fn cluster_secret_name(cluster: &ArkCluster) -> String {
    format!("{}-cluster-secrets", cluster.name_any())
}

/// Builds the Secret holding the cluster-wide RCON password. Created once
/// during the `Create` stage and never overwritten afterward, so an
/// already-running server's password doesn't change out from under it.
pub fn cluster_secret(cluster: &ArkCluster, rcon_password: &str) -> Secret {
    let mut string_data = BTreeMap::new();
    string_data.insert(RCON_PASSWORD_ENV_KEY.to_string(), rcon_password.to_string());

    Secret {
        metadata: ObjectMeta {
            name: Some(cluster_secret_name(cluster)),
            namespace: cluster.namespace(),
            labels: Some(base_labels(cluster, "secrets")),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        string_data: Some(string_data),
        ..Default::default()
    }
}

/// Generates a random password for first-time secret creation.
pub fn generate_rcon_password() -> String {
    use rand::Rng;
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

/// The one-shot Job that lays down the initial SteamCMD install onto both
/// server volumes and seeds the shared data volume with default configs.
pub fn init_job(cluster: &ArkCluster) -> Job {
    let name = format!("{}-init", cluster.name_any());
    let server_a = server_pvc_name(cluster, ActiveVolume::ServerA);
    let server_b = server_pvc_name(cluster, ActiveVolume::ServerB);
    let data = data_pvc_name(cluster);

    Job {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: cluster.namespace(),
            labels: Some(base_labels(cluster, "init")),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(3),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(base_labels(cluster, "init")),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("OnFailure".to_string()),
                    containers: vec![Container {
                        name: "steamcmd".to_string(),
                        image: Some("steamcmd/steamcmd:latest".to_string()),
                        command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
                        args: Some(vec![format!(
                            "steamcmd +force_install_dir /server-a +login anonymous +app_update 2430930 validate +quit && \
                             steamcmd +force_install_dir /server-b +login anonymous +app_update 2430930 validate +quit && \
                             mkdir -p /data/configs /data/saves /data/mods"
                        )]),
                        volume_mounts: Some(vec![
                            VolumeMount {
                                name: "server-a".to_string(),
                                mount_path: "/server-a".to_string(),
                                ..Default::default()
                            },
                            VolumeMount {
                                name: "server-b".to_string(),
                                mount_path: "/server-b".to_string(),
                                ..Default::default()
                            },
                            VolumeMount {
                                name: "data".to_string(),
                                mount_path: "/data".to_string(),
                                ..Default::default()
                            },
                        ]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![
                        Volume {
                            name: "server-a".to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: server_a,
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        Volume {
                            name: "server-b".to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: server_b,
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        Volume {
                            name: "data".to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: data,
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The Job that installs a new build onto the volume that is currently
/// inactive (the standby side of the A/B swap), leaving the live server
/// untouched until the restart coordinator cuts over (§4.6).
pub fn update_job(cluster: &ArkCluster, target_volume: ActiveVolume) -> Job {
    let name = format!("{}-update-{}", cluster.name_any(), target_volume.as_str());
    let server_pvc_name = server_pvc_name(cluster, target_volume);

    Job {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: cluster.namespace(),
            labels: Some(base_labels(cluster, "update")),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(3),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(base_labels(cluster, "update")),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("OnFailure".to_string()),
                    containers: vec![Container {
                        name: "steamcmd".to_string(),
                        image: Some("steamcmd/steamcmd:latest".to_string()),
                        command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
                        args: Some(vec![
                            "steamcmd +force_install_dir /server +login anonymous +app_update 2430930 validate +quit"
                                .to_string(),
                        ]),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "server".to_string(),
                            mount_path: "/server".to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: "server".to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: server_pvc_name,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn pod_name(cluster: &ArkCluster, map_id: &str) -> String {
    format!("{}-{}", cluster.name_any(), crate::maps::get_map_slug(map_id))
}

/// Builds the per-map game server Pod. `game_port`/`rcon_port` are already
/// resolved by the caller from `server.gamePortStart`/`rconPortStart` plus
/// the map's index in the ordered selection. `env` is the fully composed
/// environment from [`crate::config::compose_env`] (§4.8), rendered as
/// container env vars alongside the three port/map identifiers the pod
/// entrypoint itself needs.
pub fn server_pod(
    cluster: &ArkCluster,
    map_id: &str,
    active_volume: ActiveVolume,
    game_port: u16,
    rcon_port: u16,
    env: &BTreeMap<String, String>,
) -> Pod {
    let spec = &cluster.spec.server;
    let name = pod_name(cluster, map_id);
    let mut labels = base_labels(cluster, "server");
    labels.insert("mort.is/map".to_string(), map_id.to_string());

    let mut env_vars: Vec<EnvVar> = vec![
        EnvVar {
            name: "ARK_MAP".to_string(),
            value: Some(map_id.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "ARK_GAME_PORT".to_string(),
            value: Some(game_port.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "ARK_RCON_PORT".to_string(),
            value: Some(rcon_port.to_string()),
            ..Default::default()
        },
    ];
    for (key, value) in env {
        env_vars.push(EnvVar {
            name: key.clone(),
            value: Some(value.clone()),
            ..Default::default()
        });
    }

    Pod {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: cluster.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            security_context: Some(k8s_openapi::api::core::v1::PodSecurityContext {
                run_as_user: Some(cluster.spec.run_as_user),
                run_as_group: Some(cluster.spec.run_as_group),
                fs_group: Some(cluster.spec.run_as_group),
                ..Default::default()
            }),
            node_selector: cluster.spec.node_selector.clone(),
            tolerations: cluster.spec.tolerations.clone(),
            containers: vec![Container {
                name: "ark".to_string(),
                image: Some("ark-operator/ark-server:latest".to_string()),
                env: Some(env_vars),
                volume_mounts: Some(vec![
                    VolumeMount {
                        name: "server".to_string(),
                        mount_path: "/server".to_string(),
                        ..Default::default()
                    },
                    VolumeMount {
                        name: "data".to_string(),
                        mount_path: "/data".to_string(),
                        ..Default::default()
                    },
                ]),
                resources: spec.resources.clone(),
                ..Default::default()
            }],
            volumes: Some(vec![
                Volume {
                    name: "server".to_string(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: server_pvc_name(cluster, active_volume),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                Volume {
                    name: "data".to_string(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: data_pvc_name(cluster),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// LoadBalancer/ClusterIP Service exposing one map's game and RCON ports.
pub fn server_service(cluster: &ArkCluster, map_id: &str, game_port: u16, rcon_port: u16) -> Service {
    let name = pod_name(cluster, map_id);
    let mut labels = base_labels(cluster, "server");
    labels.insert("mort.is/map".to_string(), map_id.to_string());
    let mut selector = BTreeMap::new();
    selector.insert(labels::INSTANCE.to_string(), cluster.name_any());
    selector.insert("mort.is/map".to_string(), map_id.to_string());

    Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: cluster.namespace(),
            labels: Some(labels),
            annotations: cluster.spec.service.annotations.clone(),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            load_balancer_ip: cluster.spec.service.load_balancer_ip.clone(),
            selector: Some(selector),
            ports: Some(vec![
                ServicePort {
                    name: Some("game".to_string()),
                    port: game_port as i32,
                    protocol: Some("UDP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some("rcon".to_string()),
                    port: rcon_port as i32,
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Unused today but kept typed so selector-based lookups can be wired to
/// the same label set the Pods/Services above are built with.
pub fn selector_for(cluster: &ArkCluster, map_id: &str) -> LabelSelector {
    let mut selector = BTreeMap::new();
    selector.insert(labels::INSTANCE.to_string(), cluster.name_any());
    selector.insert("mort.is/map".to_string(), map_id.to_string());
    LabelSelector {
        match_labels: Some(selector),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_below_minimum() {
        let err = validate_pvc_size("server", "5Gi", MIN_SERVER_SIZE, None).unwrap_err();
        assert!(matches!(err, Error::PvcTooSmall { .. }));
    }

    #[test]
    fn rejects_shrink() {
        let err = validate_pvc_size("server", "60Gi", MIN_SERVER_SIZE, Some("70Gi")).unwrap_err();
        assert!(matches!(err, Error::PvcShrink { .. }));
    }

    #[test]
    fn accepts_growth() {
        assert!(validate_pvc_size("server", "70Gi", MIN_SERVER_SIZE, Some("60Gi")).is_ok());
    }
}
