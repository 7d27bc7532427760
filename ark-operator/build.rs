use ark_types::*;
use kube::CustomResourceExt;
use std::fs;

fn main() {
    let _ = fs::create_dir("../crds");
    fs::write(
        "../crds/mort.is_arkcluster_crd.yaml",
        serde_yaml::to_string(&ArkCluster::crd()).unwrap(),
    )
    .unwrap();
}
