use k8s_openapi::api::core::v1::{ResourceRequirements, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The fixed precedence list used when ordering expanded map selectors.
/// `TheIsland_WP` and friends sort first, in this order; everything else
/// sorts lexicographically after.
pub const OFFICIAL_MAP_ORDER: &[&str] = &[
    "TheIsland_WP",
    "TheCenter_WP",
    "ScorchedEarth_WP",
    "Aberration_WP",
    "Extinction_WP",
];

/// The "club ark" map id, which has its params/opts/mods envs stripped from
/// the global overlay.
pub const CLUB_MAP_ID: &str = "BobsMissions_WP";

#[derive(
    CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema,
)]
#[kube(
    group = "mort.is",
    version = "v1beta1",
    kind = "ArkCluster",
    plural = "arkclusters",
    derive = "PartialEq",
    status = "ArkClusterStatus",
    namespaced
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.state\", \"name\": \"STATE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.activeVolume\", \"name\": \"ACTIVE-VOLUME\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.activeBuildid\", \"name\": \"ACTIVE-BUILD\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.latestBuildid\", \"name\": \"LATEST-BUILD\", \"type\": \"integer\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct ArkClusterSpec {
    #[serde(default)]
    pub server: ArkServerSpec,

    #[serde(default)]
    pub data: ArkDataSpec,

    #[serde(default)]
    pub global_settings: ArkGlobalSettings,

    #[serde(default)]
    pub service: ArkServiceSpec,

    #[serde(default = "default_run_as_user")]
    pub run_as_user: i64,

    #[serde(default = "default_run_as_group")]
    pub run_as_group: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
}

fn default_run_as_user() -> i64 {
    1000
}

fn default_run_as_group() -> i64 {
    1000
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArkServerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    #[serde(default = "default_server_size")]
    pub size: String,

    #[serde(default = "default_maps")]
    pub maps: Vec<String>,

    #[serde(default)]
    pub persist: bool,

    #[serde(default = "default_game_port_start")]
    pub game_port_start: i32,

    #[serde(default = "default_rcon_port_start")]
    pub rcon_port_start: i32,

    #[serde(default)]
    pub suspend: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

fn default_server_size() -> String {
    "50Gi".to_string()
}

fn default_maps() -> Vec<String> {
    vec!["@canonical".to_string()]
}

fn default_game_port_start() -> i32 {
    7777
}

fn default_rcon_port_start() -> i32 {
    27020
}

impl Default for ArkServerSpec {
    fn default() -> Self {
        ArkServerSpec {
            storage_class: None,
            size: default_server_size(),
            maps: default_maps(),
            persist: false,
            game_port_start: default_game_port_start(),
            rcon_port_start: default_rcon_port_start(),
            suspend: Vec::new(),
            resources: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArkDataSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    #[serde(default = "default_server_size")]
    pub size: String,

    #[serde(default = "default_true")]
    pub persist: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ArkDataSpec {
    fn default() -> Self {
        ArkDataSpec {
            storage_class: None,
            size: default_server_size(),
            persist: true,
        }
    }
}

/// Platforms allowed to join a cluster. Used for the `ServerPlatform`
/// command-line option.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum Platform {
    #[serde(rename = "ALL")]
    All,
    #[serde(rename = "PS5")]
    Ps5,
    #[serde(rename = "XSX")]
    Xsx,
    #[serde(rename = "WINGDK")]
    WinGdk,
    #[serde(rename = "STEAM")]
    Steam,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::All => "ALL",
            Platform::Ps5 => "PS5",
            Platform::Xsx => "XSX",
            Platform::WinGdk => "WINGDK",
            Platform::Steam => "STEAM",
        };
        write!(f, "{s}")
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArkGlobalSettings {
    #[serde(default = "default_session_name_format")]
    pub session_name_format: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multihome_ip: Option<String>,

    #[serde(default = "default_max_players")]
    pub max_players: i32,

    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,

    #[serde(default = "default_true")]
    pub battleye: bool,

    #[serde(default = "default_allowed_platforms")]
    pub allowed_platforms: Vec<Platform>,

    #[serde(default)]
    pub whitelist: bool,

    #[serde(default)]
    pub params: Vec<String>,

    #[serde(default)]
    pub opts: Vec<String>,

    #[serde(default)]
    pub mods: Vec<i64>,
}

fn default_session_name_format() -> String {
    "ASA - {map_name}".to_string()
}

fn default_max_players() -> i32 {
    70
}

fn default_cluster_id() -> String {
    "ark-cluster".to_string()
}

fn default_allowed_platforms() -> Vec<Platform> {
    vec![Platform::All]
}

impl Default for ArkGlobalSettings {
    fn default() -> Self {
        ArkGlobalSettings {
            session_name_format: default_session_name_format(),
            multihome_ip: None,
            max_players: default_max_players(),
            cluster_id: default_cluster_id(),
            battleye: true,
            allowed_platforms: default_allowed_platforms(),
            whitelist: false,
            params: Vec::new(),
            opts: Vec::new(),
            mods: Vec::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArkServiceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Checkpoints persisted during `ArkCluster` creation/resume reconciliation.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStage {
    ServerPvc,
    DataPvc,
    InitPvc,
    Create,
}

impl ClusterStage {
    pub const ALL: [ClusterStage; 4] = [
        ClusterStage::ServerPvc,
        ClusterStage::DataPvc,
        ClusterStage::InitPvc,
        ClusterStage::Create,
    ];
}

/// The server volume currently mounted by running pods.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveVolume {
    ServerA,
    ServerB,
}

impl ActiveVolume {
    /// The volume that isn't currently active -- the staging target for the
    /// next build.
    pub fn other(self) -> ActiveVolume {
        match self {
            ActiveVolume::ServerA => ActiveVolume::ServerB,
            ActiveVolume::ServerB => ActiveVolume::ServerA,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActiveVolume::ServerA => "server-a",
            ActiveVolume::ServerB => "server-b",
        }
    }
}

impl fmt::Display for ActiveVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for ActiveVolume {
    fn default() -> Self {
        ActiveVolume::ServerA
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestartStatus {
    pub reason: String,
    pub started_at: String,
    pub active_volume: ActiveVolume,
}

/// Status object for the [`ArkCluster`] resource.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArkClusterStatus {
    #[serde(default)]
    pub ready: bool,

    #[serde(default = "default_state")]
    pub state: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<BTreeMap<ClusterStage, bool>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_volume: Option<ActiveVolume>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_buildid: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_buildid: Option<u64>,

    /// RFC 3339 timestamp of the last time the operator polled Steam for
    /// the latest build id, used to throttle checks to `BUILD_CHECK_INTERVAL`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_build_check: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<RestartStatus>,
}

fn default_state() -> String {
    "Initializing".to_string()
}

/// The `"Error: "` prefix that marks `status.state` as a terminal failure.
pub const ERROR_STATE_PREFIX: &str = "Error: ";

impl ArkClusterStatus {
    pub fn is_error(&self) -> bool {
        self.state.starts_with(ERROR_STATE_PREFIX)
    }

    pub fn is_stage_completed(&self, stage: ClusterStage) -> bool {
        self.stages
            .as_ref()
            .and_then(|s| s.get(&stage).copied())
            .unwrap_or(false)
    }

    pub fn mark_stage_complete(&mut self, stage: ClusterStage) {
        self.stages.get_or_insert_with(BTreeMap::new).insert(stage, true);
    }

    pub fn set_error(&mut self, message: impl fmt::Display) {
        self.state = format!("{ERROR_STATE_PREFIX}{message}");
        self.ready = false;
        self.stages = None;
    }
}

impl PartialOrd for ClusterStage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClusterStage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(s: &ClusterStage) -> u8 {
            match s {
                ClusterStage::ServerPvc => 0,
                ClusterStage::DataPvc => 1,
                ClusterStage::InitPvc => 2,
                ClusterStage::Create => 3,
            }
        }
        rank(self).cmp(&rank(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_prefix_round_trips() {
        let mut status = ArkClusterStatus::default();
        status.set_error("PVC is too small. Min size is 1Mi");
        assert!(status.is_error());
        assert_eq!(status.state, "Error: PVC is too small. Min size is 1Mi");
        assert!(!status.ready);
        assert!(status.stages.is_none());
    }

    #[test]
    fn stage_tracking() {
        let mut status = ArkClusterStatus::default();
        assert!(!status.is_stage_completed(ClusterStage::ServerPvc));
        status.mark_stage_complete(ClusterStage::ServerPvc);
        assert!(status.is_stage_completed(ClusterStage::ServerPvc));
        assert!(!status.is_stage_completed(ClusterStage::DataPvc));
    }

    #[test]
    fn active_volume_flips() {
        assert_eq!(ActiveVolume::ServerA.other(), ActiveVolume::ServerB);
        assert_eq!(ActiveVolume::ServerB.other(), ActiveVolume::ServerA);
    }
}
