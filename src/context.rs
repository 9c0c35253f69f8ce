// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context handed to every reconciler.
//!
//! The context owns the object store, the controller configuration, the
//! ensure runner and the error backoff of each resource. It is constructed
//! once in `main` (or per test with the in-memory store) and shared by `Arc`.

use crate::config::ControllerConfig;
use crate::constants::MAX_ERROR_REQUEUE_DURATION_SECS;
use crate::reconcilers::ensure::EnsureRunner;
use crate::reconcilers::retry::{error_backoff, ExponentialBackoff};
use crate::store::ObjectStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Dependencies of the reconcilers.
pub struct Context<S> {
    /// Store every read and write goes through.
    pub store: Arc<S>,

    pub config: ControllerConfig,

    /// Runner executing the pipelines against `store`.
    pub runner: EnsureRunner<S>,

    /// Backoff of resources whose last reconcile failed, by `kind/namespace/name`.
    error_backoffs: Mutex<HashMap<String, ExponentialBackoff>>,
}

impl<S: ObjectStore> Context<S> {
    pub fn new(store: Arc<S>, config: ControllerConfig) -> Self {
        let runner = EnsureRunner::new(store.clone(), config.reconcile_timeout());
        Self {
            store,
            config,
            runner,
            error_backoffs: Mutex::new(HashMap::new()),
        }
    }

    /// Namespace the jobs and generated secrets live in.
    #[must_use]
    pub fn controller_namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Delay before retrying a failed reconcile of `key`, growing with every
    /// consecutive failure.
    pub fn next_error_requeue(&self, key: &str) -> Duration {
        let mut backoffs = self
            .error_backoffs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        backoffs
            .entry(key.to_string())
            .or_insert_with(error_backoff)
            .next_backoff()
            .unwrap_or(Duration::from_secs(MAX_ERROR_REQUEUE_DURATION_SECS))
    }

    /// Forgets the failures of `key` after a successful reconcile.
    pub fn clear_error_requeue(&self, key: &str) {
        self.error_backoffs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
