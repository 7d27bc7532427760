pub const TERMINATING: &str = "The ArkCluster is being terminated.";
pub const WAIT_PVC: &str = "waiting for PVCs to be ready";
pub const WAIT_INIT_JOB: &str = "waiting for volume init job to complete";
pub const WAIT_INIT_RESOURCES: &str = "waiting for cluster resources to be created";
pub const WAIT_UPDATE_JOB: &str = "waiting for server update job to complete";
pub const RESTART_ALREADY_IN_PROGRESS: &str = "restart already in progress";

pub fn starting(pod_name: &str) -> String {
    format!("the game server pod '{pod_name}' is starting")
}

pub fn active(pod_name: &str) -> String {
    format!("the game server pod '{pod_name}' is active and running")
}
