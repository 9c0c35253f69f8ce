// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The ensure runner: the generic reconciliation kernel.
//!
//! A [`Pipeline`] is an ordered list of step values plus an `ensure` function
//! interpreting one step against the resource and a per-pass state value. The
//! [`EnsureRunner`] executes the steps strictly in order and owns everything
//! that is not domain logic:
//!
//! 1. `lastReconcile` is stamped and [`Pipeline::prepare`] applied before the
//!    first step runs.
//! 2. The first [`StepOutcome::Requeue`] ends the pass with that delay.
//! 3. [`StepOutcome::Stop`] ends the pass cleanly, unless the pipeline asks to
//!    carry on past stops (the delete variant).
//! 4. A store conflict from a step becomes a requeue after
//!    [`REQUEUE_IMMEDIATE_MILLIS`] and is never surfaced; every other error
//!    aborts the pass and is returned.
//! 5. A pass where every step continued marks `Ready` and stamps `lastSuccess`.
//! 6. The status is always persisted as a merge patch of the diff against the
//!    snapshot taken before the steps ran, conditional on `resourceVersion`.
//!    A conflicting write is retried once against a fresh read; a resource
//!    that vanished is not an error.
//!
//! Every step must be safe to re-run from the top: the runner never resumes a
//! pass part way through.

use crate::crd::{HasCommonStatus, ReconcileMark};
use crate::constants::REQUEUE_IMMEDIATE_MILLIS;
use crate::errors::{ReconcileError, StoreError};
use crate::reconcilers::status::ConditionTracker;
use crate::status_reasons::CONDITION_TYPE_READY;
use crate::store::{Namespaced, ObjectStore};
use async_trait::async_trait;
use chrono::Utc;
use kube::{Resource, ResourceExt};
use serde_json::{Map, Value};
use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// What a step asks the runner to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Run the next step.
    Continue,
    /// End the pass and revisit the resource after the delay.
    Requeue(Duration),
    /// End the pass without an error or a requeue.
    Stop,
}

/// Result of a whole pass, mapped onto a controller action by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileResult {
    Complete,
    RequeueAfter(Duration),
}

/// Requeue used for optimistic concurrency conflicts.
#[must_use]
pub fn requeue_immediate() -> Duration {
    Duration::from_millis(REQUEUE_IMMEDIATE_MILLIS)
}

/// An ordered list of steps for one resource type.
#[async_trait]
pub trait Pipeline: Send + Sync {
    type Resource: Namespaced + HasCommonStatus;
    type Step: Copy + Debug + Display + Send + Sync;
    /// Per-pass state threaded between steps, discarded after the pass.
    type State: Default + Send;

    fn steps(&self) -> &[Self::Step];

    /// When true a [`StepOutcome::Stop`] skips to the next step instead of
    /// ending the pass.
    fn continue_on_stop(&self) -> bool {
        false
    }

    /// Adjusts the resource after the status snapshot is taken and before the
    /// first step runs, so the changes are persisted with the pass.
    fn prepare(&self, _resource: &mut Self::Resource) {}

    async fn ensure(
        &self,
        step: Self::Step,
        resource: &mut Self::Resource,
        state: &mut Self::State,
    ) -> Result<StepOutcome, ReconcileError>;
}

enum Flow {
    Completed,
    Requeue(Duration),
    Stopped,
    Failed(ReconcileError),
}

/// Executes pipelines against a store.
pub struct EnsureRunner<S> {
    store: Arc<S>,
    deadline: Duration,
}

impl<S: ObjectStore> EnsureRunner<S> {
    /// `deadline` bounds a single pass; a step still running when it expires
    /// fails with [`ReconcileError::DeadlineExceeded`].
    pub fn new(store: Arc<S>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// Runs every step of `pipeline` against `resource` and persists the status.
    ///
    /// # Errors
    ///
    /// Returns the first non-conflict step error, or the status write error.
    pub async fn run<P: Pipeline>(
        &self,
        pipeline: &P,
        mut resource: P::Resource,
    ) -> Result<ReconcileResult, ReconcileError> {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();
        let generation = resource.meta().generation.unwrap_or(0);
        let original = status_value(&resource)?;

        resource.common_status_mut().last_reconcile = Some(ReconcileMark {
            time: Utc::now().to_rfc3339(),
            generation,
        });
        pipeline.prepare(&mut resource);

        let flow = self.run_steps(pipeline, &mut resource, &namespace, &name).await;

        if matches!(flow, Flow::Completed) {
            let status = resource.common_status_mut();
            ConditionTracker::new(status, CONDITION_TYPE_READY, generation)
                .success("Resource ready");
            status.last_success = Some(ReconcileMark {
                time: Utc::now().to_rfc3339(),
                generation,
            });
        }

        let persisted = self
            .persist_status(&resource, &original, &namespace, &name)
            .await;

        match (flow, persisted) {
            (Flow::Failed(e), _) => Err(e),
            (_, Err(e)) if e.is_conflict() => {
                Ok(ReconcileResult::RequeueAfter(requeue_immediate()))
            }
            (_, Err(e)) => {
                error!(
                    namespace = %namespace,
                    name = %name,
                    error = %e,
                    "Failed to update the status of resource"
                );
                Err(e.into())
            }
            (Flow::Requeue(after), Ok(())) => Ok(ReconcileResult::RequeueAfter(after)),
            (Flow::Completed | Flow::Stopped, Ok(())) => Ok(ReconcileResult::Complete),
        }
    }

    async fn run_steps<P: Pipeline>(
        &self,
        pipeline: &P,
        resource: &mut P::Resource,
        namespace: &str,
        name: &str,
    ) -> Flow {
        let deadline = tokio::time::Instant::now() + self.deadline;
        let mut state = P::State::default();

        for step in pipeline.steps().iter().copied() {
            debug!(namespace = %namespace, name = %name, step = %step, "Running step");

            let ensured = pipeline.ensure(step, resource, &mut state);
            let result = tokio::time::timeout_at(deadline, ensured)
                .await
                .unwrap_or_else(|_| {
                    Err(ReconcileError::DeadlineExceeded {
                        step: step.to_string(),
                    })
                });

            match result {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Requeue(after)) => {
                    debug!(namespace = %namespace, name = %name, step = %step, requeue = ?after, "Step requested requeue");
                    return Flow::Requeue(after);
                }
                Ok(StepOutcome::Stop) if pipeline.continue_on_stop() => {
                    debug!(namespace = %namespace, name = %name, step = %step, "Step stopped, continuing with next step");
                }
                Ok(StepOutcome::Stop) => {
                    debug!(namespace = %namespace, name = %name, step = %step, "Step stopped the pipeline");
                    return Flow::Stopped;
                }
                Err(e) if e.is_conflict() => {
                    debug!(namespace = %namespace, name = %name, step = %step, "Conflict, requeueing immediately");
                    return Flow::Requeue(requeue_immediate());
                }
                Err(e) => {
                    warn!(namespace = %namespace, name = %name, step = %step, error = %e, "Step failed");
                    return Flow::Failed(e);
                }
            }
        }

        Flow::Completed
    }

    async fn persist_status<K: Namespaced + HasCommonStatus>(
        &self,
        resource: &K,
        original: &Value,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let current = status_value(resource).map_err(|source| StoreError::Serialization {
            kind: K::kind(&()).to_string(),
            source,
        })?;
        let Some(diff) = merge_diff(original, &current) else {
            return Ok(());
        };

        let mut version = resource.resource_version();
        for attempt in 0..2 {
            let patch = serde_json::json!({
                "metadata": { "resourceVersion": version },
                "status": diff,
            });
            match self.store.patch_status::<K>(namespace, name, &patch).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) if e.is_conflict() && attempt == 0 => {
                    debug!(namespace = %namespace, name = %name, "Status patch conflicted, reapplying against a fresh read");
                    match self.store.get::<K>(namespace, name).await {
                        Ok(fresh) => version = fresh.resource_version(),
                        Err(e) if e.is_not_found() => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Conflict {
            kind: K::kind(&()).to_string(),
            name: name.to_string(),
            message: "status changed concurrently".to_string(),
        })
    }
}

fn status_value<K: Namespaced>(resource: &K) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(resource)?;
    Ok(value
        .get_mut("status")
        .map(Value::take)
        .unwrap_or(Value::Null))
}

/// Computes the JSON merge patch turning `from` into `to`, `None` when equal.
#[must_use]
pub fn merge_diff(from: &Value, to: &Value) -> Option<Value> {
    match (from, to) {
        (Value::Object(old), Value::Object(new)) => {
            let mut patch = Map::new();
            for (key, new_value) in new {
                match old.get(key) {
                    Some(old_value) => {
                        if let Some(diff) = merge_diff(old_value, new_value) {
                            patch.insert(key.clone(), diff);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in old.keys() {
                if !new.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        _ if from == to => None,
        _ => Some(to.clone()),
    }
}

#[cfg(test)]
#[path = "ensure_tests.rs"]
mod ensure_tests;
