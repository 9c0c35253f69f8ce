// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for Terraform driven provisioning.
//!
//! # Resource Types
//!
//! - [`Configuration`] - A terraform module to plan, apply and eventually destroy
//! - [`Provider`] - Cloud credentials consumed by the stage jobs
//! - [`Policy`] - Cluster wide module allow-lists, checkov constraints and default variables
//!
//! # Example: Creating a Configuration
//!
//! ```rust,no_run
//! use terranetes::crd::{ConfigurationSpec, ProviderReference};
//!
//! let spec = ConfigurationSpec {
//!     module: "https://github.com/terraform-aws-modules/terraform-aws-s3-bucket?ref=v3.1.0".to_string(),
//!     provider_ref: ProviderReference {
//!         name: "aws".to_string(),
//!         namespace: Some("terraform-system".to_string()),
//!     },
//!     variables: Some(serde_json::json!({ "bucket": "my-bucket" })),
//!     enable_auto_approval: false,
//!     ..Default::default()
//! };
//! ```

use crate::constants::{
    AUTH_SECRET_PREFIX, CONFIG_SECRET_PREFIX, COST_SECRET_PREFIX, POLICY_SECRET_PREFIX,
    STATE_SECRET_PREFIX,
};
use crate::labels::{APPLY_ANNOTATION, ORPHAN_ANNOTATION};
use crate::status_reasons::{CONDITION_TYPE_READY, STATUS_TRUE};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema for free-form JSON documents (terraform variables).
fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// Label selector to match Kubernetes resources.
///
/// A label selector is a label query over a set of resources. The result of matchLabels and
/// matchExpressions are `ANDed`. An empty label selector matches all objects.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Map of {key,value} pairs. All requirements must be satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,

    /// List of label selector requirements. All requirements must be satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_expressions: Option<Vec<LabelSelectorRequirement>>,
}

/// A label selector requirement is a selector that contains values, a key, and an operator
/// that relates the key and values.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LabelSelectorRequirement {
    /// The label key that the selector applies to.
    pub key: String,

    /// Valid operators are In, `NotIn`, Exists and `DoesNotExist`.
    pub operator: String,

    /// Non-empty for In and `NotIn`, empty for Exists and `DoesNotExist`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

/// Condition represents an observation of a resource's current state.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition: Ready, ProviderReady, TerraformPlan, TerraformPolicy,
    /// TerraformApply or TerraformDestroy.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation of the resource the condition was computed against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// A point in time paired with the generation observed at that time.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileMark {
    /// RFC3339 timestamp.
    pub time: String,
    /// Generation of the resource.
    pub generation: i64,
}

/// Status embedded by every resource reconciled by the ensure runner.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommonStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Stamped at the start of every reconcile pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconcile: Option<ReconcileMark>,

    /// Stamped only when every step of the pipeline completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<ReconcileMark>,
}

impl CommonStatus {
    /// Looks up a condition by type.
    #[must_use]
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    /// Returns true when the named condition is `True`.
    #[must_use]
    pub fn is_true(&self, condition_type: &str) -> bool {
        self.condition(condition_type)
            .is_some_and(|c| c.status == STATUS_TRUE)
    }
}

/// Access to the [`CommonStatus`] of a resource, whatever its concrete status type.
pub trait HasCommonStatus {
    fn common_status(&self) -> Option<&CommonStatus>;
    fn common_status_mut(&mut self) -> &mut CommonStatus;
}

// ============================================================================
// Configuration
// ============================================================================

/// Reference to a `Provider`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReference {
    /// Name of the provider.
    pub name: String,
    /// Namespace of the provider, defaults to the namespace of the referrer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Reference to a `Secret`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Where to write the terraform outputs once the apply completes.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WriteConnectionSecret {
    /// Name of the secret, created in the namespace of the `Configuration`.
    pub name: String,

    /// Outputs to project. When empty every output is written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

/// `Configuration` describes a terraform module the controller plans, applies and destroys.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "terraform.appvia.io",
    version = "v1alpha1",
    kind = "Configuration",
    namespaced,
    shortname = "conf",
    doc = "Configuration is a terraform module the controller plans and applies through ephemeral jobs, tearing the infrastructure down when the resource is deleted."
)]
#[kube(status = "ConfigurationStatus")]
#[kube(printcolumn = r#"{"name":"Module","type":"string","jsonPath":".spec.module"}"#)]
#[kube(printcolumn = r#"{"name":"Resources","type":"integer","jsonPath":".status.resources"}"#)]
#[kube(printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSpec {
    /// Source of the terraform module (any go-getter URL).
    pub module: String,

    /// Provider supplying credentials to the stage jobs.
    pub provider_ref: ProviderReference,

    /// Secret used to authenticate against a private module source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<SecretReference>,

    /// Raw terraform variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub variables: Option<serde_json::Value>,

    /// Secret the terraform outputs are written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<WriteConnectionSecret>,

    /// Apply without waiting for the apply annotation.
    #[serde(default)]
    pub enable_auto_approval: bool,

    /// Terraform version, honoured only when the controller permits overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_version: Option<String>,
}

/// Cost estimate produced during the plan stage.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostStatus {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly: Option<String>,
}

/// `Configuration` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationStatus {
    #[serde(flatten)]
    pub common: CommonStatus,

    /// Number of managed resources in the terraform state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub costs: Option<CostStatus>,
}

/// Tri-state apply approval carried by the apply annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Approval {
    /// Annotation set to `"true"`.
    Approved,
    /// Annotation set to `"false"`.
    Withheld,
    /// Annotation absent (or unrecognised), defer to `spec.enableAutoApproval`.
    Default,
}

impl Configuration {
    fn uid_suffixed(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.uid().unwrap_or_default())
    }

    /// Secret holding the rendered backend, provider and variables.
    #[must_use]
    pub fn config_secret_name(&self) -> String {
        self.uid_suffixed(CONFIG_SECRET_PREFIX)
    }

    /// Secret the terraform kubernetes backend stores the state in.
    #[must_use]
    pub fn state_secret_name(&self) -> String {
        self.uid_suffixed(STATE_SECRET_PREFIX)
    }

    #[must_use]
    pub fn policy_secret_name(&self) -> String {
        self.uid_suffixed(POLICY_SECRET_PREFIX)
    }

    #[must_use]
    pub fn cost_secret_name(&self) -> String {
        self.uid_suffixed(COST_SECRET_PREFIX)
    }

    #[must_use]
    pub fn auth_secret_name(&self) -> String {
        self.uid_suffixed(AUTH_SECRET_PREFIX)
    }

    /// Generation of the spec, zero when the server has not assigned one.
    #[must_use]
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or(0)
    }

    /// Reads the apply annotation.
    #[must_use]
    pub fn approval(&self) -> Approval {
        match self.annotations().get(APPLY_ANNOTATION).map(String::as_str) {
            Some("true") => Approval::Approved,
            Some("false") => Approval::Withheld,
            _ => Approval::Default,
        }
    }

    /// True when deletion must leave the cloud resources in place.
    #[must_use]
    pub fn is_orphaned(&self) -> bool {
        self.annotations()
            .get(ORPHAN_ANNOTATION)
            .is_some_and(|v| v == "true")
    }

    /// Namespace of the referenced provider.
    #[must_use]
    pub fn provider_namespace(&self) -> String {
        self.spec
            .provider_ref
            .namespace
            .clone()
            .unwrap_or_else(|| self.namespace().unwrap_or_default())
    }
}

impl HasCommonStatus for Configuration {
    fn common_status(&self) -> Option<&CommonStatus> {
        self.status.as_ref().map(|s| &s.common)
    }

    fn common_status_mut(&mut self) -> &mut CommonStatus {
        &mut self.status.get_or_insert_with(Default::default).common
    }
}

// ============================================================================
// Provider
// ============================================================================

/// `Provider` supplies credentials for a terraform provider.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "terraform.appvia.io",
    version = "v1alpha1",
    kind = "Provider",
    namespaced,
    doc = "Provider holds the credentials terraform uses to reach a cloud vendor."
)]
#[kube(status = "ProviderStatus")]
#[kube(printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".spec.provider"}"#)]
#[kube(printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// Terraform provider name, for example `aws`, `google` or `azurerm`.
    pub provider: String,

    /// Secret holding the credentials, exposed to the stage jobs as environment.
    pub secret_ref: SecretReference,

    /// Optional raw provider block configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub configuration: Option<serde_json::Value>,
}

/// `Provider` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    #[serde(flatten)]
    pub common: CommonStatus,
}

impl Provider {
    /// True when the provider reports `Ready=True`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.common_status()
            .is_some_and(|s| s.is_true(CONDITION_TYPE_READY))
    }
}

impl HasCommonStatus for Provider {
    fn common_status(&self) -> Option<&CommonStatus> {
        self.status.as_ref().map(|s| &s.common)
    }

    fn common_status_mut(&mut self) -> &mut CommonStatus {
        &mut self.status.get_or_insert_with(Default::default).common
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Selects `Configuration`s by namespace labels and/or module source.
///
/// Both criteria must hold when both are present. An empty selector matches everything.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicySelector {
    /// Labels the namespace of the `Configuration` must carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<LabelSelector>,

    /// Regular expressions, any of which must match the module source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<String>>,
}

/// Regular expressions a module source must match.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConstraint {
    #[serde(default)]
    pub allowed: Vec<String>,
}

/// Checkov checks enforced against the plan.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckovConstraint {
    /// Checks to run, all checks when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<String>>,

    /// Checks to skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_checks: Option<Vec<String>>,

    /// Limits the constraint to matching configurations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<PolicySelector>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<ModuleConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkov: Option<CheckovConstraint>,
}

/// Variables injected into matching configurations.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DefaultVariables {
    #[serde(default)]
    pub selector: PolicySelector,

    #[schemars(schema_with = "preserve_unknown_fields")]
    pub variables: serde_json::Value,
}

/// `Policy` constrains and decorates every `Configuration` in the cluster.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "terraform.appvia.io",
    version = "v1alpha1",
    kind = "Policy",
    doc = "Policy constrains which modules may be used, which checkov checks run against plans, and which default variables are injected."
)]
#[kube(status = "PolicyStatus")]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Vec<DefaultVariables>>,
}

/// `Policy` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    #[serde(flatten)]
    pub common: CommonStatus,
}
