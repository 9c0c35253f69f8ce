// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Create-or-update helpers for objects the reconcilers derive.
//!
//! Derived objects are written with a create, falling back to a replace when
//! the object exists and differs from the desired one. A replace carries the
//! observed `resourceVersion`, so a concurrent writer surfaces as
//! [`StoreError::Conflict`] and the pass is retried.
//!
//! # Example
//!
//! ```rust,no_run
//! use terranetes::reconcilers::resources::{apply_secret, secret_data};
//! use terranetes::store::KubeStore;
//! use k8s_openapi::api::core::v1::Secret;
//! use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
//! use std::collections::BTreeMap;
//!
//! async fn example(store: &KubeStore) -> Result<(), terranetes::errors::ReconcileError> {
//!     let secret = Secret {
//!         metadata: ObjectMeta {
//!             name: Some("outputs".to_string()),
//!             ..Default::default()
//!         },
//!         data: Some(secret_data(BTreeMap::from([(
//!             "BUCKET".to_string(),
//!             "assets".to_string(),
//!         )]))),
//!         ..Default::default()
//!     };
//!     apply_secret(store, "apps", secret).await?;
//!     Ok(())
//! }
//! ```

use crate::errors::{ReconcileError, StoreError};
use crate::store::{Namespaced, ObjectStore};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Creates `desired`, or replaces the existing object when `unchanged` says it differs.
///
/// Returns the object as stored. An object created concurrently between the
/// read and the create is reported as a conflict.
///
/// # Errors
///
/// Returns the store error of the read, create or replace.
pub async fn create_or_replace<S, K, F>(
    store: &S,
    namespace: &str,
    desired: K,
    unchanged: F,
) -> Result<K, ReconcileError>
where
    S: ObjectStore,
    K: Namespaced,
    F: FnOnce(&K, &K) -> bool + Send,
{
    let name = desired.name_any();
    let kind = K::kind(&()).to_string();

    let Some(existing) = store.find::<K>(namespace, &name).await? else {
        debug!(namespace = %namespace, name = %name, kind = %kind, "Creating resource");
        return match store.create(namespace, &desired).await {
            Ok(created) => {
                info!(namespace = %namespace, name = %name, kind = %kind, "Created resource");
                Ok(created)
            }
            Err(e) if e.is_already_exists() => Err(StoreError::Conflict {
                kind,
                name,
                message: "created concurrently".to_string(),
            }
            .into()),
            Err(e) => Err(e.into()),
        };
    };

    if unchanged(&existing, &desired) {
        return Ok(existing);
    }

    let mut updated = desired;
    updated.meta_mut().resource_version = existing.resource_version();
    let replaced = store.replace(namespace, &name, &updated).await?;
    info!(namespace = %namespace, name = %name, kind = %kind, "Replaced resource");
    Ok(replaced)
}

/// Creates or replaces a secret, leaving it untouched when data and labels match.
///
/// # Errors
///
/// Returns the store error of the read, create or replace.
pub async fn apply_secret<S: ObjectStore>(
    store: &S,
    namespace: &str,
    desired: Secret,
) -> Result<Secret, ReconcileError> {
    create_or_replace(store, namespace, desired, |existing, desired| {
        existing.data == desired.data && existing.labels() == desired.labels()
    })
    .await
}

/// Encodes string documents as secret data.
#[must_use]
pub fn secret_data(documents: BTreeMap<String, String>) -> BTreeMap<String, ByteString> {
    documents
        .into_iter()
        .map(|(key, value)| (key, ByteString(value.into_bytes())))
        .collect()
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
