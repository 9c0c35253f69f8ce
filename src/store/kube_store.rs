// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`ObjectStore`] backed by the Kubernetes API server.

use super::{ClusterScoped, Namespaced, ObjectStore, StoreObject};
use crate::errors::StoreError;
use crate::reconcilers::retry::retry_api_call;
use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;

/// Store that talks to the API server through a shared [`Client`].
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn kind_of<K: StoreObject>() -> String {
    K::kind(&()).to_string()
}

/// Maps API failures onto the typed store errors the reconcilers branch on.
pub(crate) fn map_error<K: StoreObject>(name: &str, err: kube::Error) -> StoreError {
    let kind = kind_of::<K>();
    let name = name.to_string();
    match err {
        kube::Error::Api(ref ae) if ae.code == 404 => StoreError::NotFound { kind, name },
        kube::Error::Api(ref ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            StoreError::AlreadyExists { kind, name }
        }
        kube::Error::Api(ref ae) if ae.code == 409 => StoreError::Conflict {
            kind,
            name,
            message: ae.message.clone(),
        },
        kube::Error::SerdeError(source) => StoreError::Serialization { kind, source },
        source => StoreError::Api { kind, name, source },
    }
}

fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        retry_api_call(
            || api.get(name),
            &format!("get {} {namespace}/{name}", kind_of::<K>()),
        )
        .await
        .map_err(|e| map_error::<K>(name, e))
    }

    async fn list<K: Namespaced>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(labels));
        retry_api_call(
            || api.list(&params),
            &format!("list {} in {namespace}", kind_of::<K>()),
        )
        .await
        .map(|list| list.items)
        .map_err(|e| map_error::<K>(namespace, e))
    }

    async fn create<K: Namespaced>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let name = object.name_any();
        let params = PostParams::default();
        retry_api_call(
            || api.create(&params, object),
            &format!("create {} {namespace}/{name}", kind_of::<K>()),
        )
        .await
        .map_err(|e| map_error::<K>(&name, e))
    }

    async fn replace<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
        object: &K,
    ) -> Result<K, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = PostParams::default();
        retry_api_call(
            || api.replace(name, &params, object),
            &format!("replace {} {namespace}/{name}", kind_of::<K>()),
        )
        .await
        .map_err(|e| map_error::<K>(name, e))
    }

    async fn patch<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::default();
        let patch = Patch::Merge(patch);
        retry_api_call(
            || api.patch(name, &params, &patch),
            &format!("patch {} {namespace}/{name}", kind_of::<K>()),
        )
        .await
        .map_err(|e| map_error::<K>(name, e))
    }

    async fn patch_status<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::default();
        let patch = Patch::Merge(patch);
        retry_api_call(
            || api.patch_status(name, &params, &patch),
            &format!("patch status {} {namespace}/{name}", kind_of::<K>()),
        )
        .await
        .map_err(|e| map_error::<K>(name, e))
    }

    async fn delete<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = DeleteParams::background();
        retry_api_call(
            || api.delete(name, &params),
            &format!("delete {} {namespace}/{name}", kind_of::<K>()),
        )
        .await
        .map(|_| ())
        .map_err(|e| map_error::<K>(name, e))
    }

    async fn get_cluster<K: ClusterScoped>(&self, name: &str) -> Result<K, StoreError> {
        let api: Api<K> = Api::all(self.client.clone());
        retry_api_call(
            || api.get(name),
            &format!("get {} {name}", kind_of::<K>()),
        )
        .await
        .map_err(|e| map_error::<K>(name, e))
    }

    async fn list_cluster<K: ClusterScoped>(&self) -> Result<Vec<K>, StoreError> {
        let api: Api<K> = Api::all(self.client.clone());
        let params = ListParams::default();
        retry_api_call(|| api.list(&params), &format!("list {}", kind_of::<K>()))
            .await
            .map(|list| list.items)
            .map_err(|e| map_error::<K>("*", e))
    }
}

#[cfg(test)]
#[path = "kube_store_tests.rs"]
mod kube_store_tests;
