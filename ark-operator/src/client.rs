//! Thin `kube::Api` wrappers for the resource kinds the operator owns
//! (§4.4). Centralizing `get`/`apply`/`delete` here keeps the reconcile and
//! action modules free of raw `kube` calls and gives every caller the same
//! not-found handling.

use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret, Service};
use kube::{
    api::{DeleteParams, Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

use crate::util::{Error, MANAGER_NAME};

/// Server-side-applies `object` into `namespace`, returning the applied
/// resource.
pub async fn apply<K>(client: Client, namespace: &str, object: &K) -> Result<K, Error>
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned,
    K::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client, namespace);
    let name = object.name_any();
    let patch = Patch::Apply(object);
    api.patch(&name, &PatchParams::apply(MANAGER_NAME).force(), &patch)
        .await
        .map_err(Error::from)
}

/// Fetches a resource by name, returning `Ok(None)` instead of an error
/// when it does not exist.
pub async fn get_opt<K>(client: Client, namespace: &str, name: &str) -> Result<Option<K>, Error>
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned,
    K::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client, namespace);
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Deletes a resource, treating "already gone" as success.
pub async fn delete<K>(client: Client, namespace: &str, name: &str) -> Result<(), Error>
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned,
    K::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client, namespace);
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub fn pvcs(client: Client, namespace: &str) -> Api<PersistentVolumeClaim> {
    Api::namespaced(client, namespace)
}

pub fn pods(client: Client, namespace: &str) -> Api<Pod> {
    Api::namespaced(client, namespace)
}

pub fn services(client: Client, namespace: &str) -> Api<Service> {
    Api::namespaced(client, namespace)
}

pub fn jobs(client: Client, namespace: &str) -> Api<Job> {
    Api::namespaced(client, namespace)
}

pub fn cronjobs(client: Client, namespace: &str) -> Api<CronJob> {
    Api::namespaced(client, namespace)
}

pub fn configmaps(client: Client, namespace: &str) -> Api<ConfigMap> {
    Api::namespaced(client, namespace)
}

pub fn secrets(client: Client, namespace: &str) -> Api<Secret> {
    Api::namespaced(client, namespace)
}
