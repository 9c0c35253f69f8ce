// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rendering of the stage jobs and of the generated terraform configuration.
//!
//! The job template is a minijinja YAML document. The built-in one ships with
//! the binary; operators can replace it with a ConfigMap (`--job-template`).
//! Identity fields (name, namespace, labels) are always overwritten after
//! rendering, so a custom template cannot break job correlation.

use crate::config::ControllerConfig;
use crate::constants::{
    JOB_TTL_AFTER_FINISHED_SECS, TERRAFORM_BACKEND_KEY, TERRAFORM_JOB_TEMPLATE_KEY,
    TERRAFORM_PROVIDER_KEY, TERRAFORM_VARIABLES_KEY,
};
use crate::crd::{CheckovConstraint, Configuration, Provider};
use crate::errors::ReconcileError;
use crate::reconcilers::jobs::{job_name, stage_labels, Stage};
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use minijinja::{context, Environment};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Job template compiled into the binary.
pub const DEFAULT_JOB_TEMPLATE: &str = include_str!("../../../templates/job.yaml");

/// Everything a stage job needs besides the configuration itself.
pub struct JobInputs<'a> {
    pub config: &'a ControllerConfig,
    pub provider: &'a Provider,
    pub template: &'a str,
    pub checkov: Option<&'a CheckovConstraint>,
    pub with_auth: bool,
}

/// Renders the job of `stage` for the configuration's current generation.
///
/// # Errors
///
/// Returns [`ReconcileError::Template`] when the template does not render or
/// does not produce a valid `Job`.
pub fn render_job(
    configuration: &Configuration,
    stage: Stage,
    inputs: &JobInputs<'_>,
) -> Result<Job, ReconcileError> {
    let uid = configuration.uid().unwrap_or_default();
    let name = job_name(&uid, configuration.generation(), stage);
    let namespace = inputs.config.namespace.as_str();
    let checkov = inputs.checkov.cloned().unwrap_or_default();

    let mut env = Environment::new();
    env.add_template(TERRAFORM_JOB_TEMPLATE_KEY, inputs.template)?;
    let rendered = env.get_template(TERRAFORM_JOB_TEMPLATE_KEY)?.render(context! {
        name => name,
        namespace => namespace,
        stage => stage.as_str(),
        ttl => JOB_TTL_AFTER_FINISHED_SECS,
        service_account => inputs.config.executor_service_account,
        module => configuration.spec.module,
        orphan => configuration.is_orphaned(),
        images => context! {
            executor => inputs.config.executor_image,
            terraform => inputs.config.terraform_image_for(configuration.spec.terraform_version.as_deref()),
            policy => inputs.config.policy_image,
            infracost => inputs.config.infracost_image,
        },
        config_secret => configuration.config_secret_name(),
        policy_secret => configuration.policy_secret_name(),
        cost_report_secret => configuration.cost_secret_name(),
        cost_secret => inputs.config.cost_secret.as_deref().filter(|s| !s.is_empty()),
        auth_secret => inputs.with_auth.then(|| configuration.auth_secret_name()),
        provider_secret => inputs.provider.spec.secret_ref.name,
        checks => checkov.checks.unwrap_or_default(),
        skip_checks => checkov.skip_checks.unwrap_or_default(),
    })?;

    let mut job: Job = serde_yaml::from_str(&rendered)?;
    let labels = stage_labels(configuration, stage);
    job.metadata.name = Some(name);
    job.metadata.namespace = Some(namespace.to_string());
    job.metadata.labels = Some(labels.clone());
    if let Some(spec) = job.spec.as_mut() {
        spec.template
            .metadata
            .get_or_insert_with(Default::default)
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels);
    }
    Ok(job)
}

/// Kubernetes backend block storing the state in `tfstate-default-<UID>`.
#[must_use]
pub fn backend_config(configuration: &Configuration, namespace: &str) -> String {
    format!(
        r#"terraform {{
  backend "kubernetes" {{
    in_cluster_config = true
    namespace         = "{namespace}"
    secret_suffix     = "{}"
  }}
}}
"#,
        configuration.uid().unwrap_or_default()
    )
}

/// Provider block; top level configuration values are written as attributes.
#[must_use]
pub fn provider_config(provider: &Provider) -> String {
    let mut block = format!("provider \"{}\" {{\n", provider.spec.provider);
    if let Some(Value::Object(attributes)) = &provider.spec.configuration {
        for (key, value) in attributes {
            block.push_str(&format!("  {key} = {value}\n"));
        }
    }
    block.push_str("}\n");
    block
}

/// Merges the policy defaults under the configuration's own variables.
///
/// Defaults are applied in order; a key set by the configuration always wins.
#[must_use]
pub fn merge_variables(defaults: &[&Value], variables: Option<&Value>) -> Value {
    let mut merged = Map::new();
    for value in defaults {
        if let Value::Object(fields) = value {
            merged.extend(fields.clone());
        }
    }
    if let Some(Value::Object(fields)) = variables {
        merged.extend(fields.clone());
    }
    Value::Object(merged)
}

/// Documents of the `config-<UID>` secret.
///
/// # Errors
///
/// Returns the JSON error when the variables cannot be encoded.
pub fn generated_config(
    configuration: &Configuration,
    provider: &Provider,
    variables: &Value,
    template: &str,
    namespace: &str,
) -> Result<BTreeMap<String, String>, ReconcileError> {
    Ok(BTreeMap::from([
        (
            TERRAFORM_BACKEND_KEY.to_string(),
            backend_config(configuration, namespace),
        ),
        (
            TERRAFORM_PROVIDER_KEY.to_string(),
            provider_config(provider),
        ),
        (
            TERRAFORM_VARIABLES_KEY.to_string(),
            serde_json::to_string_pretty(variables)?,
        ),
        (TERRAFORM_JOB_TEMPLATE_KEY.to_string(), template.to_string()),
    ]))
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod template_tests;
