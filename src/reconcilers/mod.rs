// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation for the terraform resources.
//!
//! Every resource type is reconciled by a [`Pipeline`](ensure::Pipeline): an
//! ordered list of steps interpreted by the shared
//! [`EnsureRunner`](ensure::EnsureRunner). The runner owns ordering, status
//! persistence and conflict handling; the pipelines own the domain logic.
//!
//! # Reconciliation Architecture
//!
//! 1. **Watch** - the controller delivers a `Configuration` or `Provider`
//! 2. **Select** - the create/update or delete pipeline is chosen
//! 3. **Ensure** - steps run in order, submitting and inspecting stage jobs
//! 4. **Status** - conditions and timestamps are patched back conditionally
//!
//! # Available Reconcilers
//!
//! - [`reconcile_configuration`] - plans, verifies, applies and destroys terraform modules
//! - [`reconcile_provider`] - checks provider credentials
//!
//! # Building blocks
//!
//! - [`ensure`] - the runner and the pipeline contract
//! - [`finalizers`] - finalizer add/remove against the store
//! - [`status`] - condition tracking
//! - [`jobs`] - stage job naming, lookup and submission
//! - [`resources`] - create-or-replace of derived objects
//! - [`retry`] - backoff for transient API errors

pub mod configuration;
pub mod ensure;
pub mod finalizers;
pub mod jobs;
pub mod provider;
pub mod resources;
pub mod retry;
pub mod status;

pub use configuration::reconcile_configuration;
pub use ensure::{EnsureRunner, ReconcileResult};
pub use provider::reconcile_provider;
