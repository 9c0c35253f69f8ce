// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `memory.rs`

#[cfg(test)]
mod tests {
    use super::super::{merge_patch, MemoryStore};
    use crate::store::ObjectStore;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;
    use kube::ResourceExt;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn secret(name: &str, finalizers: Option<Vec<String>>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
                finalizers,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_patch_removes_nulls_and_replaces_arrays() {
        let mut target = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": [1, 2]});
        merge_patch(&mut target, &json!({"a": null, "b": {"c": 5}, "e": [3]}));
        assert_eq!(target, json!({"b": {"c": 5, "d": 3}, "e": [3]}));
    }

    #[tokio::test]
    async fn test_create_twice_is_already_exists() {
        let store = MemoryStore::new();
        store.create("ns", &secret("a", None)).await.unwrap();
        let err = store.create("ns", &secret("a", None)).await.unwrap_err();

        assert!(err.is_already_exists());
        assert_eq!(store.created("Secret"), vec!["a", "a"]);
    }

    #[tokio::test]
    async fn test_stale_resource_version_conflicts() {
        let store = MemoryStore::new();
        let created = store.create("ns", &secret("a", None)).await.unwrap();
        let version = created.resource_version().unwrap();

        store
            .patch::<Secret>("ns", "a", &json!({"metadata": {"labels": {"x": "y"}}}))
            .await
            .unwrap();

        let err = store
            .patch::<Secret>(
                "ns",
                "a",
                &json!({"metadata": {"resourceVersion": version, "labels": {"x": "z"}}}),
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_delete_waits_for_finalizers() {
        let store = MemoryStore::new();
        store
            .create("ns", &secret("a", Some(vec!["keep".to_string()])))
            .await
            .unwrap();

        store.delete::<Secret>("ns", "a").await.unwrap();
        let marked: Secret = store.get("ns", "a").await.unwrap();
        assert!(marked.metadata.deletion_timestamp.is_some());

        store
            .patch::<Secret>("ns", "a", &json!({"metadata": {"finalizers": []}}))
            .await
            .unwrap();
        assert!(store.find::<Secret>("ns", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_labels() {
        let store = MemoryStore::new();
        store.create("ns", &secret("a", None)).await.unwrap();
        store.create("ns", &secret("b", None)).await.unwrap();
        store.create("other", &secret("a", None)).await.unwrap();

        let labels = BTreeMap::from([("app".to_string(), "a".to_string())]);
        let found: Vec<Secret> = store.list("ns", &labels).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name_any(), "a");
    }
}
