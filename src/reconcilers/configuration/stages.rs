// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Steps that generate the terraform configuration and drive the stage jobs.

use super::policy::{checkov_constraint, checkov_failures, default_variables};
use super::template::{self, render_job, JobInputs, DEFAULT_JOB_TEMPLATE};
use super::{apply_secret, condition, secret_data, PipelineState};
use crate::constants::{
    COST_REPORT_KEY, JOB_RUNNING_REQUEUE_SECS, JOB_SUBMITTED_REQUEUE_SECS, POLICY_RESULTS_KEY,
};
use crate::context::Context;
use crate::crd::{Approval, Configuration, CostStatus};
use crate::errors::ReconcileError;
use crate::labels::{APPLY_ANNOTATION, CONFIGURATION_GENERATION_LABEL};
use crate::reconcilers::ensure::StepOutcome;
use crate::reconcilers::jobs::{
    configuration_labels, find_stage_job, job_name, job_progress, submit_or_await, Stage,
    StageProgress,
};
use crate::status_reasons::{
    CONDITION_TYPE_TERRAFORM_APPLY, CONDITION_TYPE_TERRAFORM_DESTROY,
    CONDITION_TYPE_TERRAFORM_PLAN, CONDITION_TYPE_TERRAFORM_POLICY, REASON_APPROVAL_PENDING,
    REASON_APPROVAL_WITHHELD, REASON_DESTROY_SKIPPED, REASON_ERROR, REASON_POLICY_FAILED,
};
use crate::store::ObjectStore;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Summary fields of an infracost breakdown.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct CostReport {
    #[serde(default)]
    total_hourly_cost: Option<String>,
    #[serde(default)]
    total_monthly_cost: Option<String>,
}

/// Reads one key of a secret in the controller namespace.
async fn read_artifact<S: ObjectStore>(
    ctx: &Context<S>,
    secret: &str,
    key: &str,
) -> Result<Option<Vec<u8>>, ReconcileError> {
    Ok(ctx
        .store
        .find::<Secret>(ctx.controller_namespace(), secret)
        .await?
        .and_then(|s| s.data)
        .and_then(|mut data| data.remove(key))
        .map(|bytes| bytes.0))
}

/// Submits or observes the job of `stage`.
///
/// Returns `None` once the job succeeded; the caller records the success.
/// A failed job marks the condition and aborts the pass.
async fn await_stage<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
    state: &mut PipelineState,
    stage: Stage,
    condition_type: &str,
) -> Result<Option<StepOutcome>, ReconcileError> {
    let Some(provider) = state.provider.as_ref() else {
        warn!(stage = %stage, "No provider resolved, cannot run stage");
        return Ok(Some(StepOutcome::Stop));
    };
    let name = job_name(
        &configuration.uid().unwrap_or_default(),
        configuration.generation(),
        stage,
    );
    let inputs = JobInputs {
        config: &ctx.config,
        provider,
        template: state
            .job_template
            .as_deref()
            .unwrap_or(DEFAULT_JOB_TEMPLATE),
        checkov: state.checkov.as_ref().map(|(_, c)| c),
        with_auth: state.auth.is_some(),
    };

    let resource: &Configuration = configuration;
    let progress = submit_or_await(
        ctx.store.as_ref(),
        ctx.controller_namespace(),
        &mut state.jobs,
        &name,
        || render_job(resource, stage, &inputs),
    )
    .await?;

    let in_progress = format!("Terraform {stage} is in progress");
    match progress {
        StageProgress::Submitted => {
            condition(configuration, condition_type).in_progress(&in_progress);
            Ok(Some(StepOutcome::Requeue(Duration::from_secs(
                JOB_SUBMITTED_REQUEUE_SECS,
            ))))
        }
        StageProgress::Running => {
            condition(configuration, condition_type).in_progress(&in_progress);
            Ok(Some(StepOutcome::Requeue(Duration::from_secs(
                JOB_RUNNING_REQUEUE_SECS,
            ))))
        }
        StageProgress::Succeeded => Ok(None),
        StageProgress::Failed => {
            warn!(
                namespace = %configuration.namespace().unwrap_or_default(),
                name = %configuration.name_any(),
                stage = %stage,
                job = %name,
                "Stage job failed"
            );
            condition(configuration, condition_type)
                .failure(REASON_ERROR, &format!("Terraform {stage} has failed"));
            Err(ReconcileError::StageFailed {
                stage: stage.to_string(),
                job: name,
            })
        }
    }
}

/// Writes `config-<UID>` (backend, provider, variables and job template).
///
/// The secret is labelled with the generation it was rendered for and left
/// alone until the spec changes.
pub(super) async fn generated_config<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &Configuration,
    state: &PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    let Some(provider) = state.provider.as_ref() else {
        return Ok(StepOutcome::Stop);
    };
    let namespace = ctx.controller_namespace();
    let name = configuration.config_secret_name();
    let generation = configuration.generation().to_string();

    if let Some(existing) = ctx.store.find::<Secret>(namespace, &name).await? {
        if existing.labels().get(CONFIGURATION_GENERATION_LABEL) == Some(&generation) {
            return Ok(StepOutcome::Continue);
        }
    }

    let defaults = default_variables(
        &state.policies,
        &state.namespace_labels,
        &configuration.spec.module,
    )?;
    let variables = template::merge_variables(&defaults, configuration.spec.variables.as_ref());
    let documents = template::generated_config(
        configuration,
        provider,
        &variables,
        state
            .job_template
            .as_deref()
            .unwrap_or(DEFAULT_JOB_TEMPLATE),
        namespace,
    )?;

    let mut labels = configuration_labels(configuration);
    labels.insert(CONFIGURATION_GENERATION_LABEL.to_string(), generation);
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(secret_data(documents)),
        ..Default::default()
    };

    info!(
        namespace = %namespace,
        secret = %secret.name_any(),
        generation = configuration.generation(),
        "Writing generated terraform configuration"
    );
    apply_secret(ctx.store.as_ref(), namespace, secret).await?;
    Ok(StepOutcome::Continue)
}

pub(super) async fn plan<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
    state: &mut PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    if let Some(outcome) = await_stage(
        ctx,
        configuration,
        state,
        Stage::Plan,
        CONDITION_TYPE_TERRAFORM_PLAN,
    )
    .await?
    {
        return Ok(outcome);
    }
    condition(configuration, CONDITION_TYPE_TERRAFORM_PLAN).success("Terraform plan is complete");
    Ok(StepOutcome::Continue)
}

/// Refreshes `status.costs` from the `costs-<UID>` report.
///
/// With cost estimation disabled the status only records that, and the
/// report is never read.
pub(super) async fn cost_status<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
) -> Result<StepOutcome, ReconcileError> {
    let costs = if ctx.config.cost_estimation_enabled() {
        let name = configuration.cost_secret_name();
        match read_artifact(ctx, &name, COST_REPORT_KEY).await? {
            Some(report) => {
                let report: CostReport = serde_json::from_slice(&report).map_err(|e| {
                    ReconcileError::InvalidArtifact {
                        name: name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                CostStatus {
                    enabled: true,
                    hourly: report.total_hourly_cost,
                    monthly: report.total_monthly_cost,
                }
            }
            None => CostStatus {
                enabled: true,
                ..Default::default()
            },
        }
    } else {
        CostStatus::default()
    };

    configuration
        .status
        .get_or_insert_with(Default::default)
        .costs = Some(costs);
    Ok(StepOutcome::Continue)
}

/// Runs the checkov constraint selecting this configuration, if any.
pub(super) async fn verify<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
    state: &mut PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    state.checkov = checkov_constraint(
        &state.policies,
        &state.namespace_labels,
        &configuration.spec.module,
    )?;
    let Some((policy, _)) = state.checkov.clone() else {
        condition(configuration, CONDITION_TYPE_TERRAFORM_POLICY)
            .success("No security policy applies to this configuration");
        return Ok(StepOutcome::Continue);
    };

    if let Some(outcome) = await_stage(
        ctx,
        configuration,
        state,
        Stage::Verify,
        CONDITION_TYPE_TERRAFORM_POLICY,
    )
    .await?
    {
        return Ok(outcome);
    }

    let secret = configuration.policy_secret_name();
    let report = read_artifact(ctx, &secret, POLICY_RESULTS_KEY)
        .await?
        .ok_or_else(|| ReconcileError::InvalidArtifact {
            name: secret.clone(),
            reason: format!("missing {POLICY_RESULTS_KEY}"),
        })?;
    let failed = checkov_failures(&report).map_err(|e| ReconcileError::InvalidArtifact {
        name: secret.clone(),
        reason: e.to_string(),
    })?;

    if failed > 0 {
        warn!(
            namespace = %configuration.namespace().unwrap_or_default(),
            name = %configuration.name_any(),
            policy = %policy,
            failed = failed,
            "Configuration failed security policy"
        );
        condition(configuration, CONDITION_TYPE_TERRAFORM_POLICY).failure(
            REASON_POLICY_FAILED,
            &format!("Configuration has failed {failed} check(s) of policy {policy}, refusing to continue"),
        );
        return Ok(StepOutcome::Stop);
    }

    condition(configuration, CONDITION_TYPE_TERRAFORM_POLICY)
        .success("Configuration passed the security policy checks");
    Ok(StepOutcome::Continue)
}

/// Holds the pipeline before apply until the generation is approved.
///
/// An apply job that already exists for this generation was approved when it
/// was submitted.
pub(super) fn approval(configuration: &mut Configuration, state: &PipelineState) -> StepOutcome {
    let uid = configuration.uid().unwrap_or_default();
    if find_stage_job(&state.jobs, &uid, configuration.generation(), Stage::Apply).is_some() {
        return StepOutcome::Continue;
    }

    match configuration.approval() {
        Approval::Approved => StepOutcome::Continue,
        Approval::Default if configuration.spec.enable_auto_approval => StepOutcome::Continue,
        Approval::Withheld => {
            condition(configuration, CONDITION_TYPE_TERRAFORM_APPLY).failure(
                REASON_APPROVAL_WITHHELD,
                &format!("Apply has been withheld by the {APPLY_ANNOTATION} annotation"),
            );
            StepOutcome::Stop
        }
        Approval::Default => {
            condition(configuration, CONDITION_TYPE_TERRAFORM_APPLY).failure(
                REASON_APPROVAL_PENDING,
                &format!("Waiting for the {APPLY_ANNOTATION}=true annotation to apply"),
            );
            StepOutcome::Stop
        }
    }
}

pub(super) async fn apply<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
    state: &mut PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    if let Some(outcome) = await_stage(
        ctx,
        configuration,
        state,
        Stage::Apply,
        CONDITION_TYPE_TERRAFORM_APPLY,
    )
    .await?
    {
        return Ok(outcome);
    }
    condition(configuration, CONDITION_TYPE_TERRAFORM_APPLY)
        .success("Terraform apply is complete");
    Ok(StepOutcome::Continue)
}

/// Runs the destroy stage.
///
/// Waits while any other stage job of the configuration is still running, so
/// an in-flight apply cannot leave resources behind without state. Skipped when
/// there is no provider to authenticate with, when no state was ever written,
/// or when `config-<UID>` is gone: that secret is only deleted after a
/// successful destroy, and the job could not mount it anyway.
pub(super) async fn destroy<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
    state: &mut PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    let destroy_job = job_name(
        &configuration.uid().unwrap_or_default(),
        configuration.generation(),
        Stage::Destroy,
    );

    if let Some(running) = state
        .jobs
        .iter()
        .find(|job| {
            job.name_any() != destroy_job && job_progress(job) == StageProgress::Running
        })
    {
        let running = running.name_any();
        info!(
            namespace = %configuration.namespace().unwrap_or_default(),
            name = %configuration.name_any(),
            job = %running,
            "Waiting for running stage job before destroying"
        );
        condition(configuration, CONDITION_TYPE_TERRAFORM_DESTROY).in_progress(&format!(
            "Waiting for job {running} to finish before terraform destroy"
        ));
        return Ok(StepOutcome::Requeue(Duration::from_secs(
            JOB_RUNNING_REQUEUE_SECS,
        )));
    }

    if state.provider.is_none() {
        condition(configuration, CONDITION_TYPE_TERRAFORM_DESTROY).failure(
            REASON_DESTROY_SKIPPED,
            "Provider is missing, terraform destroy skipped",
        );
        return Ok(StepOutcome::Stop);
    }

    let submitted = state.jobs.iter().any(|job| job.name_any() == destroy_job);
    if !submitted {
        let namespace = ctx.controller_namespace();
        if ctx
            .store
            .find::<Secret>(namespace, &configuration.config_secret_name())
            .await?
            .is_none()
        {
            condition(configuration, CONDITION_TYPE_TERRAFORM_DESTROY).failure(
                REASON_DESTROY_SKIPPED,
                "No terraform configuration exists, nothing to destroy",
            );
            return Ok(StepOutcome::Stop);
        }

        if ctx
            .store
            .find::<Secret>(namespace, &configuration.state_secret_name())
            .await?
            .is_none()
        {
            condition(configuration, CONDITION_TYPE_TERRAFORM_DESTROY).failure(
                REASON_DESTROY_SKIPPED,
                "No terraform state exists, nothing to destroy",
            );
            return Ok(StepOutcome::Stop);
        }
    }

    if let Some(outcome) = await_stage(
        ctx,
        configuration,
        state,
        Stage::Destroy,
        CONDITION_TYPE_TERRAFORM_DESTROY,
    )
    .await?
    {
        return Ok(outcome);
    }
    condition(configuration, CONDITION_TYPE_TERRAFORM_DESTROY)
        .success("Terraform destroy is complete");
    Ok(StepOutcome::Continue)
}
