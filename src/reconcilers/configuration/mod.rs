// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `Configuration` reconciliation.
//!
//! A configuration is reconciled by one of two pipelines run through the
//! [`EnsureRunner`](crate::reconcilers::ensure::EnsureRunner):
//!
//! - [`create_steps`] drives the current generation through plan, policy
//!   verification, approval and apply, then folds the terraform state back
//!   into status and the connection secret.
//! - [`delete_steps`] runs once the resource is marked for deletion: it
//!   destroys the infrastructure, removes every derived object and finally
//!   releases the finalizer.
//!
//! Steps are plain values; the pipeline interprets them one at a time and
//! threads a [`PipelineState`] between them.

mod cleanup;
mod outputs;
pub mod policy;
mod preflight;
mod stages;
pub mod state;
pub mod template;

pub use state::PipelineState;

pub(crate) use crate::reconcilers::resources::{apply_secret, secret_data};

use crate::context::Context;
use crate::crd::{Configuration, HasCommonStatus};
use crate::errors::ReconcileError;
use crate::labels::FINALIZER_CONFIGURATION;
use crate::reconcilers::ensure::{Pipeline, ReconcileResult, StepOutcome};
use crate::reconcilers::finalizers::is_deletion_candidate;
use crate::reconcilers::status::{register_conditions, ConditionTracker};
use crate::status_reasons::CONFIGURATION_CONDITIONS;
use crate::store::ObjectStore;
use async_trait::async_trait;
use kube::ResourceExt;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// One step of a configuration pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigurationStep {
    AddFinalizer,
    LoadPolicies,
    LoadJobs,
    ModuleAllowed,
    RemoveStaleJobs,
    CostSecret,
    JobTemplate,
    AuthSecret,
    ProviderReady,
    GeneratedConfig,
    Plan,
    CostStatus,
    Verify,
    Approval,
    Apply,
    TerraformStatus,
    ConnectionSecret,
    Destroy,
    DeleteConfig,
    DeleteSecrets,
    DeleteJobs,
    RemoveFinalizer,
}

impl fmt::Display for ConfigurationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigurationStep::AddFinalizer => "add-finalizer",
            ConfigurationStep::LoadPolicies => "load-policies",
            ConfigurationStep::LoadJobs => "load-jobs",
            ConfigurationStep::ModuleAllowed => "module-allowed",
            ConfigurationStep::RemoveStaleJobs => "remove-stale-jobs",
            ConfigurationStep::CostSecret => "cost-secret",
            ConfigurationStep::JobTemplate => "job-template",
            ConfigurationStep::AuthSecret => "auth-secret",
            ConfigurationStep::ProviderReady => "provider-ready",
            ConfigurationStep::GeneratedConfig => "generated-config",
            ConfigurationStep::Plan => "plan",
            ConfigurationStep::CostStatus => "cost-status",
            ConfigurationStep::Verify => "verify",
            ConfigurationStep::Approval => "approval",
            ConfigurationStep::Apply => "apply",
            ConfigurationStep::TerraformStatus => "terraform-status",
            ConfigurationStep::ConnectionSecret => "connection-secret",
            ConfigurationStep::Destroy => "destroy",
            ConfigurationStep::DeleteConfig => "delete-config",
            ConfigurationStep::DeleteSecrets => "delete-secrets",
            ConfigurationStep::DeleteJobs => "delete-jobs",
            ConfigurationStep::RemoveFinalizer => "remove-finalizer",
        };
        f.write_str(name)
    }
}

/// Steps of the create/update pipeline, in order.
#[must_use]
pub fn create_steps() -> Vec<ConfigurationStep> {
    use ConfigurationStep::*;
    vec![
        AddFinalizer,
        LoadPolicies,
        LoadJobs,
        ModuleAllowed,
        RemoveStaleJobs,
        CostSecret,
        JobTemplate,
        AuthSecret,
        ProviderReady,
        GeneratedConfig,
        Plan,
        CostStatus,
        Verify,
        Approval,
        Apply,
        TerraformStatus,
        ConnectionSecret,
    ]
}

/// Steps of the delete pipeline, in order.
#[must_use]
pub fn delete_steps() -> Vec<ConfigurationStep> {
    use ConfigurationStep::*;
    vec![
        LoadPolicies,
        LoadJobs,
        ProviderReady,
        AuthSecret,
        JobTemplate,
        Destroy,
        DeleteConfig,
        DeleteSecrets,
        DeleteJobs,
        RemoveFinalizer,
    ]
}

/// A configuration pipeline bound to the controller context.
pub struct ConfigurationPipeline<S> {
    ctx: Arc<Context<S>>,
    steps: Vec<ConfigurationStep>,
    deleting: bool,
}

impl<S: ObjectStore> ConfigurationPipeline<S> {
    #[must_use]
    pub fn create(ctx: Arc<Context<S>>) -> Self {
        Self {
            ctx,
            steps: create_steps(),
            deleting: false,
        }
    }

    /// The delete variant carries on past steps that stop, so a missing
    /// dependency cannot wedge the cleanup.
    #[must_use]
    pub fn delete(ctx: Arc<Context<S>>) -> Self {
        Self {
            ctx,
            steps: delete_steps(),
            deleting: true,
        }
    }
}

#[async_trait]
impl<S: ObjectStore> Pipeline for ConfigurationPipeline<S> {
    type Resource = Configuration;
    type Step = ConfigurationStep;
    type State = PipelineState;

    fn steps(&self) -> &[ConfigurationStep] {
        &self.steps
    }

    fn continue_on_stop(&self) -> bool {
        self.deleting
    }

    fn prepare(&self, configuration: &mut Configuration) {
        if !self.deleting {
            let generation = configuration.generation();
            register_conditions(
                configuration.common_status_mut(),
                CONFIGURATION_CONDITIONS,
                generation,
            );
        }
    }

    async fn ensure(
        &self,
        step: ConfigurationStep,
        configuration: &mut Configuration,
        state: &mut PipelineState,
    ) -> Result<StepOutcome, ReconcileError> {
        let ctx = self.ctx.as_ref();
        match step {
            ConfigurationStep::AddFinalizer => preflight::add_finalizer(ctx, configuration).await,
            ConfigurationStep::LoadPolicies => {
                preflight::load_policies(ctx, configuration, state).await
            }
            ConfigurationStep::LoadJobs => preflight::load_jobs(ctx, configuration, state).await,
            ConfigurationStep::ModuleAllowed => preflight::module_allowed(configuration, state),
            ConfigurationStep::RemoveStaleJobs => {
                preflight::remove_stale_jobs(ctx, configuration, state).await
            }
            ConfigurationStep::CostSecret => preflight::cost_secret(ctx, configuration).await,
            ConfigurationStep::JobTemplate => {
                preflight::job_template(ctx, configuration, state, self.deleting).await
            }
            ConfigurationStep::AuthSecret => {
                preflight::auth_secret(ctx, configuration, state, self.deleting).await
            }
            ConfigurationStep::ProviderReady => {
                preflight::provider_ready(ctx, configuration, state, self.deleting).await
            }
            ConfigurationStep::GeneratedConfig => {
                stages::generated_config(ctx, configuration, state).await
            }
            ConfigurationStep::Plan => stages::plan(ctx, configuration, state).await,
            ConfigurationStep::CostStatus => stages::cost_status(ctx, configuration).await,
            ConfigurationStep::Verify => stages::verify(ctx, configuration, state).await,
            ConfigurationStep::Approval => Ok(stages::approval(configuration, state)),
            ConfigurationStep::Apply => stages::apply(ctx, configuration, state).await,
            ConfigurationStep::TerraformStatus => {
                outputs::terraform_status(ctx, configuration, state).await
            }
            ConfigurationStep::ConnectionSecret => {
                outputs::connection_secret(ctx, configuration, state).await
            }
            ConfigurationStep::Destroy => stages::destroy(ctx, configuration, state).await,
            ConfigurationStep::DeleteConfig => cleanup::delete_config(ctx, configuration).await,
            ConfigurationStep::DeleteSecrets => cleanup::delete_secrets(ctx, configuration).await,
            ConfigurationStep::DeleteJobs => {
                cleanup::delete_jobs(ctx, configuration, state).await
            }
            ConfigurationStep::RemoveFinalizer => {
                cleanup::remove_finalizer(ctx, configuration).await
            }
        }
    }
}

/// Tracker for one condition of the configuration's current generation.
pub(crate) fn condition<'a>(
    configuration: &'a mut Configuration,
    condition_type: &'a str,
) -> ConditionTracker<'a> {
    let generation = configuration.generation();
    ConditionTracker::new(
        configuration.common_status_mut(),
        condition_type,
        generation,
    )
}

/// Reconciles one `Configuration`.
///
/// Chooses the delete pipeline when the resource is marked for deletion and
/// still carries the finalizer, otherwise runs the create/update pipeline.
///
/// # Errors
///
/// Returns the first error a step surfaced, or the status write error.
pub async fn reconcile_configuration<S: ObjectStore>(
    ctx: Arc<Context<S>>,
    configuration: Configuration,
) -> Result<ReconcileResult, ReconcileError> {
    let namespace = configuration.namespace().unwrap_or_default();
    let name = configuration.name_any();

    if is_deletion_candidate(&configuration, FINALIZER_CONFIGURATION) {
        info!(namespace = %namespace, name = %name, "Deleting Configuration");
        let pipeline = ConfigurationPipeline::delete(ctx.clone());
        return ctx.runner.run(&pipeline, configuration).await;
    }

    if configuration.metadata.deletion_timestamp.is_some() {
        // Marked for deletion without our finalizer: nothing left to clean up.
        return Ok(ReconcileResult::Complete);
    }

    info!(
        namespace = %namespace,
        name = %name,
        generation = configuration.generation(),
        "Reconciling Configuration"
    );

    let pipeline = ConfigurationPipeline::create(ctx.clone());
    ctx.runner.run(&pipeline, configuration).await
}
