// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Terranetes - Terraform driven provisioning for Kubernetes
//!
//! Terranetes is a Kubernetes operator that turns `Configuration` resources
//! into cloud infrastructure by running Terraform in stage jobs (plan, policy
//! verification, apply and destroy) and folding the results back into status.
//!
//! ## Modules
//!
//! - [`crd`] - `Configuration`, `Provider` and `Policy` resource types
//! - [`reconcilers`] - the ensure runner and the per-resource pipelines
//! - [`store`] - the object store seam over the Kubernetes API
//! - [`context`] - shared state handed to every reconcile
//! - [`config`] - controller flags
//! - [`terraform`] - terraform state decoding
//! - [`selector`] - label selector and job to configuration mapping
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use terranetes::crd::{ConfigurationSpec, ProviderReference};
//!
//! let spec = ConfigurationSpec {
//!     module: "https://github.com/terraform-aws-modules/terraform-aws-s3-bucket?ref=v4.1.0"
//!         .to_string(),
//!     provider_ref: ProviderReference {
//!         name: "aws".to_string(),
//!         namespace: Some("terraform-system".to_string()),
//!     },
//!     variables: Some(serde_json::json!({"bucket": "assets"})),
//!     ..Default::default()
//! };
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod selector;
pub mod status_reasons;
pub mod store;
pub mod terraform;

#[cfg(test)]
mod crd_tests;
#[cfg(test)]
mod status_reasons_tests;
