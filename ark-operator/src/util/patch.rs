use super::MANAGER_NAME;
use ark_types::{ArkCluster, ArkClusterStatus};
use kube::{
    api::{Patch, PatchParams, Resource},
    core::NamespaceResourceScope,
    Api, Client, Error,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// A resource whose status subresource can be mutated in place.
pub trait Object<S> {
    fn mut_status(&mut self) -> &mut S;
}

/// A status subresource that stamps its own update time.
pub trait Status {
    fn set_last_updated(&mut self, now: chrono::DateTime<chrono::Utc>);
}

impl Object<ArkClusterStatus> for ArkCluster {
    fn mut_status(&mut self) -> &mut ArkClusterStatus {
        if self.status.is_none() {
            self.status = Some(ArkClusterStatus::default());
        }
        self.status.as_mut().unwrap()
    }
}

impl Status for ArkClusterStatus {
    fn set_last_updated(&mut self, now: chrono::DateTime<chrono::Utc>) {
        self.last_update = Some(now.to_rfc3339());
    }
}

/// Patches the resource's status subresource with a JSON merge-patch
/// containing only the fields the closure actually touched, and always
/// stamps `lastUpdate` (§4.4).
pub async fn patch_status<S, T>(client: Client, instance: &T, f: impl FnOnce(&mut S)) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone + Resource + Object<S> + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
    S: Status,
{
    let patch = Patch::Json::<T>({
        let mut modified = instance.clone();
        let status = modified.mut_status();
        f(status);
        status.set_last_updated(chrono::Utc::now());
        json_patch::diff(
            &serde_json::to_value(instance).expect("resource serializes"),
            &serde_json::to_value(&modified).expect("resource serializes"),
        )
    });
    let name = instance.meta().name.as_deref().expect("resource has a name");
    let namespace = instance
        .meta()
        .namespace
        .as_deref()
        .expect("resource is namespaced");
    let api: Api<T> = Api::namespaced(client, namespace);
    api.patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await
}
