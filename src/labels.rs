// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! The configuration labels are stamped on every job and secret derived from a
//! `Configuration`; the job orchestrator relies on them to enumerate and
//! correlate work without an ownership index.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

/// Value for `app.kubernetes.io/part-of` indicating this resource is part of Terranetes
pub const PART_OF_TERRANETES: &str = "terranetes";

/// Value for `app.kubernetes.io/managed-by` on objects created by the controller
pub const MANAGED_BY_CONTROLLER: &str = "terranetes-controller";

// ============================================================================
// Configuration Labels
// ============================================================================

/// Generation of the `Configuration` the object was derived from
pub const CONFIGURATION_GENERATION_LABEL: &str = "terraform.appvia.io/generation";

/// Name of the `Configuration` the object belongs to
pub const CONFIGURATION_NAME_LABEL: &str = "terraform.appvia.io/configuration";

/// UID of the `Configuration` the object belongs to
pub const CONFIGURATION_UID_LABEL: &str = "terraform.appvia.io/configuration-uid";

/// Namespace of the `Configuration` the object belongs to
pub const CONFIGURATION_NAMESPACE_LABEL: &str = "terraform.appvia.io/namespace";

/// Stage (plan, apply, destroy, verify) a job runs
pub const CONFIGURATION_STAGE_LABEL: &str = "terraform.appvia.io/stage";

// ============================================================================
// Annotations
// ============================================================================

/// Apply approval: absent defers to `spec.enableAutoApproval`, `"true"` approves,
/// `"false"` withholds.
pub const APPLY_ANNOTATION: &str = "terraform.appvia.io/apply";

/// Deleting the `Configuration` must not destroy the cloud resources
pub const ORPHAN_ANNOTATION: &str = "terraform.appvia.io/orphan";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer for `Configuration` resources
pub const FINALIZER_CONFIGURATION: &str = "terraform.appvia.io/configuration-finalizer";
