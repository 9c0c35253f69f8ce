// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic finalizer management for Kubernetes resources.
//!
//! A finalizer blocks physical deletion until the delete pipeline has run its
//! cleanup steps. [`ensure_finalizer`] is the first step of a create pipeline
//! and [`remove_finalizer`] the last step of a delete pipeline; both are no-ops
//! when the marker is already in the desired state.
//!
//! Both patch the finalizer list with the resource's `resourceVersion` as a
//! precondition, so a concurrent writer surfaces as a store conflict instead
//! of a lost update. On success the in-memory resource takes the returned
//! metadata, keeping later conditional writes in the same pass valid.

use crate::errors::StoreError;
use crate::store::{Namespaced, ObjectStore};
use kube::ResourceExt;
use serde_json::json;
use tracing::info;

/// True when the resource carries `finalizer`.
#[must_use]
pub fn has_finalizer<K: ResourceExt>(resource: &K, finalizer: &str) -> bool {
    resource.finalizers().iter().any(|f| f == finalizer)
}

/// True iff deletion was requested and `finalizer` still blocks it.
#[must_use]
pub fn is_deletion_candidate<K: ResourceExt>(resource: &K, finalizer: &str) -> bool {
    resource.meta().deletion_timestamp.is_some() && has_finalizer(resource, finalizer)
}

async fn patch_finalizers<S, K>(
    store: &S,
    resource: &mut K,
    finalizers: Vec<String>,
) -> Result<(), StoreError>
where
    S: ObjectStore,
    K: Namespaced,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    let patch = json!({
        "metadata": {
            "resourceVersion": resource.resource_version(),
            "finalizers": finalizers,
        }
    });
    let updated: K = store.patch(&namespace, &name, &patch).await?;
    *resource.meta_mut() = updated.meta().clone();
    Ok(())
}

/// Add a finalizer to a resource if not already present.
///
/// Returns `true` when the finalizer was added by this call.
///
/// # Errors
///
/// Returns the store error of the patch, including conflicts.
pub async fn ensure_finalizer<S, K>(
    store: &S,
    resource: &mut K,
    finalizer: &str,
) -> Result<bool, StoreError>
where
    S: ObjectStore,
    K: Namespaced,
{
    if has_finalizer(resource, finalizer) {
        return Ok(false);
    }

    info!(
        "Adding finalizer {} to {}/{} {}",
        finalizer,
        resource.namespace().unwrap_or_default(),
        resource.name_any(),
        K::kind(&())
    );

    let mut finalizers = resource.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    patch_finalizers(store, resource, finalizers).await?;
    Ok(true)
}

/// Remove a finalizer from a resource.
///
/// Once the last finalizer is gone the API server deletes an object that was
/// marked for deletion. A resource that has already vanished counts as done.
///
/// # Errors
///
/// Returns the store error of the patch, including conflicts.
pub async fn remove_finalizer<S, K>(
    store: &S,
    resource: &mut K,
    finalizer: &str,
) -> Result<bool, StoreError>
where
    S: ObjectStore,
    K: Namespaced,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(false);
    }

    info!(
        "Removing finalizer {} from {}/{} {}",
        finalizer,
        resource.namespace().unwrap_or_default(),
        resource.name_any(),
        K::kind(&())
    );

    let finalizers: Vec<String> = resource
        .finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();

    match patch_finalizers(store, resource, finalizers.clone()).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            resource.meta_mut().finalizers = Some(finalizers);
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
