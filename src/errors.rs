// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types shared by the store and the reconcilers.
//!
//! Conflicts are the one store failure the ensure runner treats as routine:
//! [`ReconcileError::is_conflict`] is how it recognises them.

use thiserror::Error;

/// Errors raised by an [`crate::store::ObjectStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The write lost an optimistic concurrency race.
    #[error("conflict updating {kind} {name}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    /// Any other API failure, after retries were exhausted.
    #[error("api error on {kind} {name}: {source}")]
    Api {
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to (de)serialize {kind}: {source}")]
    Serialization {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// Failures a pipeline step can surface.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stage job reached a terminal failure.
    #[error("{stage} job {job} failed")]
    StageFailed { stage: String, job: String },

    /// A job artifact could not be parsed.
    #[error("invalid artifact in {name}: {reason}")]
    InvalidArtifact { name: String, reason: String },

    #[error("failed to render job template: {0}")]
    Template(String),

    #[error("invalid policy {policy}: {reason}")]
    InvalidPolicy { policy: String, reason: String },

    /// The reconcile pass overran its deadline.
    #[error("step {step} exceeded the reconcile deadline")]
    DeadlineExceeded { step: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcileError {
    /// True for optimistic concurrency conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::Store(e) if e.is_conflict())
    }

    /// Short error class used as a metrics label.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            ReconcileError::Store(StoreError::Conflict { .. }) => "conflict",
            ReconcileError::Store(StoreError::NotFound { .. }) => "not_found",
            ReconcileError::Store(_) => "api",
            ReconcileError::StageFailed { .. } => "stage_failed",
            ReconcileError::InvalidArtifact { .. } => "invalid_artifact",
            ReconcileError::Template(_) => "template",
            ReconcileError::InvalidPolicy { .. } => "invalid_policy",
            ReconcileError::DeadlineExceeded { .. } => "deadline_exceeded",
            ReconcileError::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_yaml::Error> for ReconcileError {
    fn from(e: serde_yaml::Error) -> Self {
        ReconcileError::Template(e.to_string())
    }
}

impl From<minijinja::Error> for ReconcileError {
    fn from(e: minijinja::Error) -> Self {
        ReconcileError::Template(e.to_string())
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
