// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard Kubernetes status condition types and reasons for Terranetes resources.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a condition has
//! a particular status.
//!
//! # Condition Types
//!
//! Every resource carries the encompassing `type: Ready` condition. A `Configuration`
//! additionally tracks one condition per pipeline concern, so an observer can tell
//! which stage a configuration is waiting on:
//!
//! ```yaml
//! status:
//!   conditions:
//!     - type: Ready
//!       status: "False"
//!       reason: ApprovalPending
//!       message: "Waiting for terraform apply annotation to be set to true"
//!     - type: ProviderReady
//!       status: "True"
//!       reason: Ready
//!     - type: TerraformPlan
//!       status: "True"
//!       reason: Ready
//!       message: "Terraform plan is complete"
//!     - type: TerraformApply
//!       status: "Unknown"
//!       reason: NotDetermined
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// Overall readiness of a resource.
pub const CONDITION_TYPE_READY: &str = "Ready";

/// The referenced `Provider` is ready for use.
pub const CONDITION_TYPE_PROVIDER_READY: &str = "ProviderReady";

/// Outcome of the terraform plan stage.
pub const CONDITION_TYPE_TERRAFORM_PLAN: &str = "TerraformPlan";

/// Outcome of the policy verification stage.
pub const CONDITION_TYPE_TERRAFORM_POLICY: &str = "TerraformPolicy";

/// Outcome of the terraform apply stage.
pub const CONDITION_TYPE_TERRAFORM_APPLY: &str = "TerraformApply";

/// Outcome of the terraform destroy stage.
pub const CONDITION_TYPE_TERRAFORM_DESTROY: &str = "TerraformDestroy";

/// Conditions registered on every `Configuration` before its pipeline runs.
pub const CONFIGURATION_CONDITIONS: &[&str] = &[
    CONDITION_TYPE_READY,
    CONDITION_TYPE_PROVIDER_READY,
    CONDITION_TYPE_TERRAFORM_PLAN,
    CONDITION_TYPE_TERRAFORM_POLICY,
    CONDITION_TYPE_TERRAFORM_APPLY,
];

// ============================================================================
// Condition Status Values
// ============================================================================

/// Condition holds.
pub const STATUS_TRUE: &str = "True";

/// Condition does not hold.
pub const STATUS_FALSE: &str = "False";

/// Condition has not been determined yet.
pub const STATUS_UNKNOWN: &str = "Unknown";

// ============================================================================
// Common Reasons
// ============================================================================

/// The condition holds.
pub const REASON_READY: &str = "Ready";

/// Work for the condition is underway (a job is running, a dependency is settling).
pub const REASON_IN_PROGRESS: &str = "InProgress";

/// The condition failed; the message carries the detail.
pub const REASON_ERROR: &str = "Error";

/// A human must act before the condition can progress.
pub const REASON_ACTION_REQUIRED: &str = "ActionRequired";

/// The condition has not been evaluated yet.
pub const REASON_NOT_DETERMINED: &str = "NotDetermined";

// ============================================================================
// Configuration Specific Reasons
// ============================================================================

/// Apply is gated on the apply annotation being set to `"true"`.
pub const REASON_APPROVAL_PENDING: &str = "ApprovalPending";

/// The apply annotation explicitly withholds approval.
pub const REASON_APPROVAL_WITHHELD: &str = "ApprovalWithheld";

/// No policy allows the module source.
pub const REASON_MODULE_NOT_ALLOWED: &str = "ModuleNotAllowed";

/// The plan failed one or more checkov checks.
pub const REASON_POLICY_FAILED: &str = "PolicyFailed";

/// A terraform output named in the connection secret allow-list was not produced.
pub const REASON_OUTPUT_MISSING: &str = "OutputMissing";

/// The referenced provider does not exist.
pub const REASON_PROVIDER_MISSING: &str = "ProviderMissing";

/// The destroy stage was skipped, cloud resources may remain.
pub const REASON_DESTROY_SKIPPED: &str = "DestroySkipped";
