// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Terranetes operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all Terranetes CRDs
pub const API_GROUP: &str = "terraform.appvia.io";

/// API version for all Terranetes CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "terraform.appvia.io/v1alpha1";

/// Kind name for `Configuration` resource
pub const KIND_CONFIGURATION: &str = "Configuration";

/// Kind name for `Provider` resource
pub const KIND_PROVIDER: &str = "Provider";

/// Kind name for `Policy` resource
pub const KIND_POLICY: &str = "Policy";

// ============================================================================
// Derived Object Name Prefixes
// ============================================================================

/// Prefix of the secret holding the rendered terraform configuration
pub const CONFIG_SECRET_PREFIX: &str = "config";

/// Prefix of the secret the terraform kubernetes backend writes state into
pub const STATE_SECRET_PREFIX: &str = "tfstate-default";

/// Prefix of the secret holding the checkov results
pub const POLICY_SECRET_PREFIX: &str = "policy";

/// Prefix of the secret holding the infracost report
pub const COST_SECRET_PREFIX: &str = "costs";

/// Prefix of the copy of the authentication secret in the controller namespace
pub const AUTH_SECRET_PREFIX: &str = "auth";

// ============================================================================
// Generated Document Keys
// ============================================================================

/// Key of the terraform backend configuration in the config secret
pub const TERRAFORM_BACKEND_KEY: &str = "backend.tf";

/// Key of the terraform variables in the config secret
pub const TERRAFORM_VARIABLES_KEY: &str = "variables.tfvars.json";

/// Key of the terraform provider configuration in the config secret
pub const TERRAFORM_PROVIDER_KEY: &str = "provider.tf";

/// Key of the rendered job template in the config secret (and job template `ConfigMap`)
pub const TERRAFORM_JOB_TEMPLATE_KEY: &str = "job.yaml";

/// Key of the state document inside the state secret
pub const TERRAFORM_STATE_KEY: &str = "tfstate";

/// Key of the checkov report inside the policy secret
pub const POLICY_RESULTS_KEY: &str = "results_json.json";

/// Key of the infracost report inside the costs secret
pub const COST_REPORT_KEY: &str = "costs.json";

// ============================================================================
// Reconciliation Timing Constants
// ============================================================================

/// Requeue delay used for store conflicts (5 milliseconds)
pub const REQUEUE_IMMEDIATE_MILLIS: u64 = 5;

/// Requeue delay while a stage job is running (10 seconds)
pub const JOB_RUNNING_REQUEUE_SECS: u64 = 10;

/// Requeue delay right after a stage job was submitted (2 seconds)
pub const JOB_SUBMITTED_REQUEUE_SECS: u64 = 2;

/// Requeue delay while a provider is not ready (30 seconds)
pub const PROVIDER_NOT_READY_REQUEUE_SECS: u64 = 30;

/// Requeue delay when a referenced secret is missing (30 seconds)
pub const MISSING_SECRET_REQUEUE_SECS: u64 = 30;

/// Requeue delay when the cost estimation secret is missing (5 minutes)
pub const MISSING_COST_SECRET_REQUEUE_SECS: u64 = 300;

/// Initial requeue duration after a failed reconcile (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Upper bound of the requeue delay for a resource that keeps failing (15 minutes)
pub const MAX_ERROR_REQUEUE_DURATION_SECS: u64 = 900;

/// Default period between full resyncs of a resource (1 hour)
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 3600;

/// Default deadline for a single reconcile pass (60 seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Stage Job Constants
// ============================================================================

/// Number of hex digits of the job identity hash kept in the job name
pub const JOB_NAME_HASH_LENGTH: usize = 16;

/// Seconds a finished job is kept before the API server removes it (7 days)
pub const JOB_TTL_AFTER_FINISHED_SECS: i32 = 604_800;

/// Default service account the stage jobs run as
pub const DEFAULT_EXECUTOR_SERVICE_ACCOUNT: &str = "terraform-executor";

// ============================================================================
// Image Defaults
// ============================================================================

/// Default executor image (module fetch, state helpers)
pub const DEFAULT_EXECUTOR_IMAGE: &str = "quay.io/appvia/terraform-executor:latest";

/// Default terraform image
pub const DEFAULT_TERRAFORM_IMAGE: &str = "hashicorp/terraform:1.1.9";

/// Default infracost image
pub const DEFAULT_INFRACOST_IMAGE: &str = "infracost/infracost:0.9.24";

/// Default checkov image
pub const DEFAULT_POLICY_IMAGE: &str = "bridgecrew/checkov:2.0.1140";

/// Default namespace the controller runs in
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "terraform-system";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 9090;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
