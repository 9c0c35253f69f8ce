// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Object store seam between the reconcilers and the Kubernetes API.
//!
//! Every read and write a pipeline step performs goes through [`ObjectStore`],
//! so the engine can be exercised against the in-memory store in tests and
//! against [`KubeStore`] in the controller. Writes are merge patches; a patch
//! carrying `metadata.resourceVersion` is conditional and fails with
//! [`StoreError::Conflict`] when the object moved on.

use crate::errors::StoreError;
use async_trait::async_trait;
use kube::core::{ClusterResourceScope, NamespaceResourceScope};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

mod kube_store;

#[cfg(test)]
pub(crate) mod memory;

pub use kube_store::KubeStore;

/// Any API object the store can carry.
pub trait StoreObject:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> StoreObject for T where
    T: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Namespaced API object.
pub trait Namespaced: StoreObject + Resource<Scope = NamespaceResourceScope> {}
impl<T> Namespaced for T where T: StoreObject + Resource<Scope = NamespaceResourceScope> {}

/// Cluster scoped API object.
pub trait ClusterScoped: StoreObject + Resource<Scope = ClusterResourceScope> {}
impl<T> ClusterScoped for T where T: StoreObject + Resource<Scope = ClusterResourceScope> {}

/// Get, list, create, patch and delete API objects.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<K, StoreError>;

    /// Lists objects carrying every label in `labels`.
    async fn list<K: Namespaced>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] when the name is taken.
    async fn create<K: Namespaced>(&self, namespace: &str, object: &K) -> Result<K, StoreError>;

    /// Replaces an object; the object's `resourceVersion` is the precondition.
    async fn replace<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
        object: &K,
    ) -> Result<K, StoreError>;

    /// JSON merge patch of the object.
    async fn patch<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K, StoreError>;

    /// JSON merge patch of the status subresource.
    async fn patch_status<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K, StoreError>;

    async fn delete<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    async fn get_cluster<K: ClusterScoped>(&self, name: &str) -> Result<K, StoreError>;

    async fn list_cluster<K: ClusterScoped>(&self) -> Result<Vec<K>, StoreError>;

    /// Like [`ObjectStore::get`] with not-found mapped to `None`.
    async fn find<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        match self.get::<K>(namespace, name).await {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deletes an object, treating not-found as done.
    async fn delete_if_exists<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        match self.delete::<K>(namespace, name).await {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(()),
        }
    }
}
