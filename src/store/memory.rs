// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`ObjectStore`] used by the engine and pipeline tests.
//!
//! Behaves like the API server where the reconcilers can tell the difference:
//! uids and resource versions are assigned on create, merge patches carrying a
//! stale `resourceVersion` conflict, and deleting an object with finalizers
//! only marks it for deletion until the last finalizer is patched away.

use super::{ClusterScoped, Namespaced, ObjectStore, StoreObject};
use crate::errors::StoreError;
use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

type Key = (String, String, String);

#[derive(Default)]
pub(crate) struct MemoryStore {
    objects: Mutex<BTreeMap<Key, Value>>,
    creates: Mutex<Vec<(String, String)>>,
    version: AtomicU64,
    status_conflicts: AtomicUsize,
}

/// RFC 7386 JSON merge patch.
pub(crate) fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(existing) = target {
        for (key, value) in fields {
            if value.is_null() {
                existing.remove(key);
            } else {
                merge_patch(existing.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn kind_of<K: StoreObject>() -> String {
    K::kind(&()).to_string()
}

fn has_finalizers(object: &Value) -> bool {
    object["metadata"]["finalizers"]
        .as_array()
        .is_some_and(|f| !f.is_empty())
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn to_value<K: StoreObject>(object: &K) -> Result<Value, StoreError> {
        serde_json::to_value(object).map_err(|source| StoreError::Serialization {
            kind: kind_of::<K>(),
            source,
        })
    }

    fn from_value<K: StoreObject>(value: Value) -> Result<K, StoreError> {
        serde_json::from_value(value).map_err(|source| StoreError::Serialization {
            kind: kind_of::<K>(),
            source,
        })
    }

    fn not_found<K: StoreObject>(name: &str) -> StoreError {
        StoreError::NotFound {
            kind: kind_of::<K>(),
            name: name.to_string(),
        }
    }

    /// Seeds an object without counting it as a create.
    pub(crate) fn insert<K: StoreObject>(&self, namespace: &str, object: &K) -> K {
        let mut value = Self::to_value(object).expect("serializable object");
        let name = object.name_any();
        let metadata = &mut value["metadata"];
        if metadata["uid"].is_null() {
            metadata["uid"] = json!(format!("uid-{name}"));
        }
        if metadata["generation"].is_null() {
            metadata["generation"] = json!(1);
        }
        if !namespace.is_empty() {
            metadata["namespace"] = json!(namespace);
        }
        metadata["resourceVersion"] = json!(self.next_version());
        self.objects.lock().unwrap().insert(
            (kind_of::<K>(), namespace.to_string(), name),
            value.clone(),
        );
        Self::from_value(value).expect("deserializable object")
    }

    /// Reads an object straight from the map.
    pub(crate) fn fetch<K: StoreObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        let value = self.objects.lock().unwrap().get(&key).cloned()?;
        Some(Self::from_value(value).expect("deserializable object"))
    }

    /// All objects of a kind in a namespace.
    pub(crate) fn all<K: StoreObject>(&self, namespace: &str) -> Vec<K> {
        let kind = kind_of::<K>();
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .map(|(_, v)| Self::from_value(v.clone()).expect("deserializable object"))
            .collect()
    }

    /// Names passed to `create` for a kind, in call order.
    pub(crate) fn created(&self, kind: &str) -> Vec<String> {
        self.creates
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Makes the next `n` status patches fail with a conflict.
    pub(crate) fn fail_next_status_patches(&self, n: usize) {
        self.status_conflicts.store(n, Ordering::SeqCst);
    }

    /// Applies a spec change the way the API server does: merge and bump the generation.
    pub(crate) fn update_spec<K: StoreObject>(&self, namespace: &str, name: &str, spec: Value) {
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        let mut objects = self.objects.lock().unwrap();
        let value = objects.get_mut(&key).expect("object exists");
        merge_patch(&mut value["spec"], &spec);
        let generation = value["metadata"]["generation"].as_i64().unwrap_or(1) + 1;
        value["metadata"]["generation"] = json!(generation);
        value["metadata"]["resourceVersion"] = json!(self.next_version());
    }

    /// Merges into any part of an object, bypassing preconditions.
    pub(crate) fn poke<K: StoreObject>(&self, namespace: &str, name: &str, patch: Value) {
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        let mut objects = self.objects.lock().unwrap();
        let value = objects.get_mut(&key).expect("object exists");
        merge_patch(value, &patch);
        value["metadata"]["resourceVersion"] = json!(self.next_version());
    }

    fn apply_patch<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get_mut(&key)
            .ok_or_else(|| Self::not_found::<K>(name))?;

        if let Some(expected) = patch["metadata"]["resourceVersion"].as_str() {
            if current["metadata"]["resourceVersion"].as_str() != Some(expected) {
                return Err(StoreError::Conflict {
                    kind: kind_of::<K>(),
                    name: name.to_string(),
                    message: "the object has been modified".to_string(),
                });
            }
        }

        merge_patch(current, patch);
        current["metadata"]["resourceVersion"] = json!(self.next_version());
        let updated = current.clone();

        if !updated["metadata"]["deletionTimestamp"].is_null() && !has_finalizers(&updated) {
            objects.remove(&key);
        }
        Self::from_value(updated)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.fetch(namespace, name)
            .ok_or_else(|| Self::not_found::<K>(name))
    }

    async fn list<K: Namespaced>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError> {
        Ok(self
            .all::<K>(namespace)
            .into_iter()
            .filter(|object| {
                let have = object.labels();
                labels.iter().all(|(k, v)| have.get(k) == Some(v))
            })
            .collect())
    }

    async fn create<K: Namespaced>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let name = object.name_any();
        self.creates
            .lock()
            .unwrap()
            .push((kind_of::<K>(), name.clone()));
        if self.fetch::<K>(namespace, &name).is_some() {
            return Err(StoreError::AlreadyExists {
                kind: kind_of::<K>(),
                name,
            });
        }
        Ok(self.insert(namespace, object))
    }

    async fn replace<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
        object: &K,
    ) -> Result<K, StoreError> {
        let existing = self
            .fetch::<K>(namespace, name)
            .ok_or_else(|| Self::not_found::<K>(name))?;
        if let Some(expected) = object.resource_version() {
            if existing.resource_version().as_deref() != Some(expected.as_str()) {
                return Err(StoreError::Conflict {
                    kind: kind_of::<K>(),
                    name: name.to_string(),
                    message: "the object has been modified".to_string(),
                });
            }
        }
        let mut value = Self::to_value(object)?;
        value["metadata"]["uid"] = json!(existing.uid());
        value["metadata"]["namespace"] = json!(namespace);
        value["metadata"]["resourceVersion"] = json!(self.next_version());
        self.objects.lock().unwrap().insert(
            (kind_of::<K>(), namespace.to_string(), name.to_string()),
            value.clone(),
        );
        Self::from_value(value)
    }

    async fn patch<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        self.apply_patch(namespace, name, patch)
    }

    async fn patch_status<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        let pending = self.status_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.status_conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Conflict {
                kind: kind_of::<K>(),
                name: name.to_string(),
                message: "injected conflict".to_string(),
            });
        }

        let mut scoped = json!({ "status": patch["status"].clone() });
        if let Some(version) = patch["metadata"]["resourceVersion"].as_str() {
            scoped["metadata"] = json!({ "resourceVersion": version });
        }
        self.apply_patch(namespace, name, &scoped)
    }

    async fn delete<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get_mut(&key)
            .ok_or_else(|| Self::not_found::<K>(name))?;

        if has_finalizers(current) {
            if current["metadata"]["deletionTimestamp"].is_null() {
                current["metadata"]["deletionTimestamp"] = json!(chrono::Utc::now()
                    .to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
                current["metadata"]["resourceVersion"] = json!(self.next_version());
            }
        } else {
            objects.remove(&key);
        }
        Ok(())
    }

    async fn get_cluster<K: ClusterScoped>(&self, name: &str) -> Result<K, StoreError> {
        self.fetch("", name).ok_or_else(|| Self::not_found::<K>(name))
    }

    async fn list_cluster<K: ClusterScoped>(&self) -> Result<Vec<K>, StoreError> {
        Ok(self.all::<K>(""))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
