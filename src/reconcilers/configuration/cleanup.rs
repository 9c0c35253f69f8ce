// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Steps of the delete pipeline that remove derived objects.

use super::PipelineState;
use crate::context::Context;
use crate::crd::Configuration;
use crate::errors::ReconcileError;
use crate::labels::FINALIZER_CONFIGURATION;
use crate::reconcilers::ensure::StepOutcome;
use crate::reconcilers::finalizers;
use crate::store::ObjectStore;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::info;

pub(super) async fn delete_config<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &Configuration,
) -> Result<StepOutcome, ReconcileError> {
    ctx.store
        .delete_if_exists::<Secret>(
            ctx.controller_namespace(),
            &configuration.config_secret_name(),
        )
        .await?;
    Ok(StepOutcome::Continue)
}

/// Deletes the policy, cost and auth secrets, and the state unless the
/// configuration is orphaned.
pub(super) async fn delete_secrets<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &Configuration,
) -> Result<StepOutcome, ReconcileError> {
    let mut names = vec![
        configuration.policy_secret_name(),
        configuration.cost_secret_name(),
        configuration.auth_secret_name(),
    ];
    if configuration.is_orphaned() {
        info!(
            namespace = %configuration.namespace().unwrap_or_default(),
            name = %configuration.name_any(),
            "Configuration is orphaned, keeping the terraform state"
        );
    } else {
        names.push(configuration.state_secret_name());
    }

    for name in &names {
        ctx.store
            .delete_if_exists::<Secret>(ctx.controller_namespace(), name)
            .await?;
    }
    Ok(StepOutcome::Continue)
}

/// Deletes every job of the configuration, whatever its generation.
pub(super) async fn delete_jobs<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &Configuration,
    state: &mut PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    for job in state.jobs.drain(..) {
        info!(
            namespace = %configuration.namespace().unwrap_or_default(),
            name = %configuration.name_any(),
            job = %job.name_any(),
            "Deleting job"
        );
        ctx.store
            .delete_if_exists::<Job>(ctx.controller_namespace(), &job.name_any())
            .await?;
    }
    Ok(StepOutcome::Continue)
}

pub(super) async fn remove_finalizer<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
) -> Result<StepOutcome, ReconcileError> {
    finalizers::remove_finalizer(ctx.store.as_ref(), configuration, FINALIZER_CONFIGURATION)
        .await?;
    Ok(StepOutcome::Continue)
}
