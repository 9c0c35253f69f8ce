// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Stage/job orchestration.
//!
//! Each terraform stage of a `Configuration` generation runs as one batch/v1
//! `Job`. The job name is a pure function of the configuration UID, the
//! generation and the stage, so at most one job exists per (resource,
//! generation, stage) and re-submitting after a crash finds the existing job
//! instead of creating a second one.
//!
//! The orchestrator never waits: [`submit_or_await`] creates the job when it
//! is missing and otherwise reports how far it got. The caller turns
//! [`StageProgress::Running`] into a requeue and relies on the job watch to be
//! woken up early.

use crate::constants::JOB_NAME_HASH_LENGTH;
use crate::crd::Configuration;
use crate::errors::ReconcileError;
use crate::labels::{
    CONFIGURATION_GENERATION_LABEL, CONFIGURATION_NAMESPACE_LABEL, CONFIGURATION_NAME_LABEL,
    CONFIGURATION_STAGE_LABEL, CONFIGURATION_UID_LABEL, K8S_MANAGED_BY, K8S_PART_OF,
    MANAGED_BY_CONTROLLER, PART_OF_TERRANETES,
};
use crate::metrics;
use crate::store::ObjectStore;
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// A unit of externally executed terraform work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Plan,
    Apply,
    Destroy,
    Verify,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Apply => "apply",
            Stage::Destroy => "destroy",
            Stage::Verify => "verify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of a stage job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageProgress {
    /// The job was created by this call.
    Submitted,
    Running,
    Succeeded,
    Failed,
}

/// Deterministic job name for a stage of a generation.
///
/// `<stage>-<first 16 hex digits of sha256("<uid>/<generation>/<stage>")>`
#[must_use]
pub fn job_name(uid: &str, generation: i64, stage: Stage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{uid}/{generation}/{stage}").as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{stage}-{}", &digest[..JOB_NAME_HASH_LENGTH])
}

/// Labels shared by every object derived from a configuration.
#[must_use]
pub fn configuration_labels(configuration: &Configuration) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            CONFIGURATION_NAME_LABEL.to_string(),
            configuration.name_any(),
        ),
        (
            CONFIGURATION_NAMESPACE_LABEL.to_string(),
            configuration.namespace().unwrap_or_default(),
        ),
        (
            CONFIGURATION_UID_LABEL.to_string(),
            configuration.uid().unwrap_or_default(),
        ),
    ])
}

/// Labels stamped on a stage job.
#[must_use]
pub fn stage_labels(configuration: &Configuration, stage: Stage) -> BTreeMap<String, String> {
    let mut labels = configuration_labels(configuration);
    labels.insert(
        CONFIGURATION_GENERATION_LABEL.to_string(),
        configuration.generation().to_string(),
    );
    labels.insert(CONFIGURATION_STAGE_LABEL.to_string(), stage.to_string());
    labels.insert(K8S_MANAGED_BY.to_string(), MANAGED_BY_CONTROLLER.to_string());
    labels.insert(K8S_PART_OF.to_string(), PART_OF_TERRANETES.to_string());
    labels
}

/// Generation a job was created for, from its labels.
#[must_use]
pub fn job_generation(job: &Job) -> Option<i64> {
    job.labels()
        .get(CONFIGURATION_GENERATION_LABEL)
        .and_then(|g| g.parse().ok())
}

/// Jobs created for a generation older than `generation`.
#[must_use]
pub fn stale_jobs(jobs: &[Job], generation: i64) -> Vec<&Job> {
    jobs.iter()
        .filter(|job| job_generation(job).is_some_and(|g| g < generation))
        .collect()
}

/// The job of a stage for a generation, if it exists.
#[must_use]
pub fn find_stage_job<'a>(
    jobs: &'a [Job],
    uid: &str,
    generation: i64,
    stage: Stage,
) -> Option<&'a Job> {
    let name = job_name(uid, generation, stage);
    jobs.iter().find(|job| job.name_any() == name)
}

/// Classifies a job from its status.
#[must_use]
pub fn job_progress(job: &Job) -> StageProgress {
    let Some(status) = job.status.as_ref() else {
        return StageProgress::Running;
    };

    let condition_true = |kind: &str| {
        status
            .conditions
            .as_ref()
            .is_some_and(|c| c.iter().any(|c| c.type_ == kind && c.status == "True"))
    };

    if condition_true("Complete") || status.succeeded.unwrap_or(0) > 0 {
        StageProgress::Succeeded
    } else if condition_true("Failed") || status.failed.unwrap_or(0) > 0 {
        StageProgress::Failed
    } else if job.metadata.deletion_timestamp.is_some() {
        warn!(job = %job.name_any(), "Stage job is being deleted, treating as failed");
        StageProgress::Failed
    } else {
        StageProgress::Running
    }
}

/// Creates the stage job when missing, otherwise reports its progress.
///
/// `jobs` is the job list loaded for this pass; a job created here is appended
/// so later steps of the same pass see it. `render` is only called when the
/// job has to be created.
///
/// # Errors
///
/// Returns rendering errors and store errors other than the job already
/// existing.
pub async fn submit_or_await<S, F>(
    store: &S,
    namespace: &str,
    jobs: &mut Vec<Job>,
    name: &str,
    render: F,
) -> Result<StageProgress, ReconcileError>
where
    S: ObjectStore,
    F: FnOnce() -> Result<Job, ReconcileError>,
{
    if let Some(job) = jobs.iter().find(|job| job.name_any() == name) {
        return Ok(job_progress(job));
    }

    let job = render()?;
    let stage = job
        .labels()
        .get(CONFIGURATION_STAGE_LABEL)
        .cloned()
        .unwrap_or_default();

    match store.create(namespace, &job).await {
        Ok(created) => {
            info!(namespace = %namespace, job = %name, stage = %stage, "Submitted stage job");
            metrics::record_stage_job_submitted(&stage);
            jobs.push(created);
            Ok(StageProgress::Submitted)
        }
        Err(e) if e.is_already_exists() => {
            let existing: Job = store.get(namespace, name).await?;
            let progress = job_progress(&existing);
            jobs.push(existing);
            Ok(progress)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod jobs_tests;
