// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Steps that gather inputs and dependencies before any stage job runs.

use super::policy::module_permitted;
use super::template::DEFAULT_JOB_TEMPLATE;
use super::{apply_secret, condition, PipelineState};
use crate::constants::{
    MISSING_COST_SECRET_REQUEUE_SECS, MISSING_SECRET_REQUEUE_SECS,
    PROVIDER_NOT_READY_REQUEUE_SECS, TERRAFORM_JOB_TEMPLATE_KEY,
};
use crate::context::Context;
use crate::crd::{Configuration, Policy, Provider};
use crate::errors::ReconcileError;
use crate::labels::{CONFIGURATION_UID_LABEL, FINALIZER_CONFIGURATION};
use crate::reconcilers::ensure::StepOutcome;
use crate::reconcilers::finalizers::ensure_finalizer;
use crate::reconcilers::jobs::{configuration_labels, job_generation, stale_jobs};
use crate::status_reasons::{
    CONDITION_TYPE_PROVIDER_READY, CONDITION_TYPE_READY, CONDITION_TYPE_TERRAFORM_PLAN,
    REASON_ERROR, REASON_MODULE_NOT_ALLOWED, REASON_PROVIDER_MISSING,
};
use crate::store::ObjectStore;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub(super) async fn add_finalizer<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
) -> Result<StepOutcome, ReconcileError> {
    ensure_finalizer(ctx.store.as_ref(), configuration, FINALIZER_CONFIGURATION).await?;
    Ok(StepOutcome::Continue)
}

/// Loads every policy (sorted by name) and the labels of the configuration's namespace.
pub(super) async fn load_policies<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &Configuration,
    state: &mut PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    let mut policies: Vec<Policy> = ctx.store.list_cluster().await?;
    policies.sort_by_key(ResourceExt::name_any);
    state.policies = policies;

    let namespace = configuration.namespace().unwrap_or_default();
    state.namespace_labels = match ctx.store.get_cluster::<Namespace>(&namespace).await {
        Ok(ns) => ns.labels().clone(),
        Err(e) if e.is_not_found() => BTreeMap::new(),
        Err(e) => return Err(e.into()),
    };

    Ok(StepOutcome::Continue)
}

/// Loads every job carrying the configuration's UID, whatever the generation.
pub(super) async fn load_jobs<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &Configuration,
    state: &mut PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    let selector = BTreeMap::from([(
        CONFIGURATION_UID_LABEL.to_string(),
        configuration.uid().unwrap_or_default(),
    )]);
    state.jobs = ctx
        .store
        .list::<Job>(ctx.controller_namespace(), &selector)
        .await?;
    Ok(StepOutcome::Continue)
}

pub(super) fn module_allowed(
    configuration: &mut Configuration,
    state: &PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    if module_permitted(&state.policies, &configuration.spec.module)? {
        return Ok(StepOutcome::Continue);
    }

    warn!(
        namespace = %configuration.namespace().unwrap_or_default(),
        name = %configuration.name_any(),
        module = %configuration.spec.module,
        "Module source not permitted by policy"
    );
    condition(configuration, CONDITION_TYPE_READY).failure(
        REASON_MODULE_NOT_ALLOWED,
        "Module source is not permitted by any of the module constraints",
    );
    Ok(StepOutcome::Stop)
}

/// Deletes jobs of superseded generations so they can never feed status.
pub(super) async fn remove_stale_jobs<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &Configuration,
    state: &mut PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    let generation = configuration.generation();
    let stale: Vec<String> = stale_jobs(&state.jobs, generation)
        .into_iter()
        .map(ResourceExt::name_any)
        .collect();

    for name in &stale {
        info!(
            namespace = %ctx.controller_namespace(),
            job = %name,
            generation = generation,
            "Deleting job of a previous generation"
        );
        ctx.store
            .delete_if_exists::<Job>(ctx.controller_namespace(), name)
            .await?;
    }

    state
        .jobs
        .retain(|job| job_generation(job).is_none_or(|g| g >= generation));
    Ok(StepOutcome::Continue)
}

/// The infracost token secret must exist when cost estimation is enabled.
pub(super) async fn cost_secret<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
) -> Result<StepOutcome, ReconcileError> {
    let Some(name) = ctx.config.cost_secret.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(StepOutcome::Continue);
    };
    let namespace = ctx.controller_namespace();

    if ctx.store.find::<Secret>(namespace, name).await?.is_some() {
        return Ok(StepOutcome::Continue);
    }

    warn!(namespace = %namespace, secret = %name, "Cost analytics secret is missing");
    condition(configuration, CONDITION_TYPE_TERRAFORM_PLAN).action_required(&format!(
        "Cost analytics secret ({namespace}/{name}) does not exist, contact platform administrator"
    ));
    Ok(StepOutcome::Requeue(Duration::from_secs(
        MISSING_COST_SECRET_REQUEUE_SECS,
    )))
}

/// Resolves the job template: the override ConfigMap when configured,
/// otherwise the built-in one.
pub(super) async fn job_template<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
    state: &mut PipelineState,
    deleting: bool,
) -> Result<StepOutcome, ReconcileError> {
    let Some(name) = ctx.config.job_template.as_deref() else {
        state.job_template = Some(DEFAULT_JOB_TEMPLATE.to_string());
        return Ok(StepOutcome::Continue);
    };
    let namespace = ctx.controller_namespace();

    let template = ctx
        .store
        .find::<ConfigMap>(namespace, name)
        .await?
        .and_then(|cm| cm.data)
        .and_then(|mut data| data.remove(TERRAFORM_JOB_TEMPLATE_KEY));

    match template {
        Some(template) => {
            state.job_template = Some(template);
            Ok(StepOutcome::Continue)
        }
        None if deleting => {
            warn!(namespace = %namespace, configmap = %name, "Custom job template missing, using the built-in template");
            state.job_template = Some(DEFAULT_JOB_TEMPLATE.to_string());
            Ok(StepOutcome::Continue)
        }
        None => {
            condition(configuration, CONDITION_TYPE_READY).failure(
                REASON_ERROR,
                &format!(
                    "Custom job template ({namespace}/{name}) does not exist or has no {TERRAFORM_JOB_TEMPLATE_KEY} key"
                ),
            );
            Ok(StepOutcome::Requeue(Duration::from_secs(
                MISSING_SECRET_REQUEUE_SECS,
            )))
        }
    }
}

/// Copies the `spec.auth` secret into the controller namespace as `auth-<UID>`.
pub(super) async fn auth_secret<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
    state: &mut PipelineState,
    deleting: bool,
) -> Result<StepOutcome, ReconcileError> {
    let Some(auth) = configuration.spec.auth.clone() else {
        return Ok(StepOutcome::Continue);
    };
    let source_namespace = auth
        .namespace
        .clone()
        .unwrap_or_else(|| configuration.namespace().unwrap_or_default());
    let namespace = ctx.controller_namespace();
    let copy_name = configuration.auth_secret_name();

    let Some(source) = ctx
        .store
        .find::<Secret>(&source_namespace, &auth.name)
        .await?
    else {
        if deleting {
            debug!(secret = %auth.name, "Authentication secret gone, using any existing copy");
            state.auth = ctx.store.find::<Secret>(namespace, &copy_name).await?;
            return Ok(StepOutcome::Continue);
        }
        condition(configuration, CONDITION_TYPE_READY).action_required(&format!(
            "Authentication secret ({source_namespace}/{}) does not exist",
            auth.name
        ));
        return Ok(StepOutcome::Requeue(Duration::from_secs(
            MISSING_SECRET_REQUEUE_SECS,
        )));
    };

    let copy = Secret {
        metadata: ObjectMeta {
            name: Some(copy_name),
            namespace: Some(namespace.to_string()),
            labels: Some(configuration_labels(configuration)),
            ..Default::default()
        },
        data: source.data,
        type_: source.type_,
        ..Default::default()
    };
    state.auth = Some(apply_secret(ctx.store.as_ref(), namespace, copy).await?);
    Ok(StepOutcome::Continue)
}

/// The referenced provider has to exist and report ready.
///
/// During deletion a missing provider stops the step so the cleanup can carry
/// on without a destroy.
pub(super) async fn provider_ready<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
    state: &mut PipelineState,
    deleting: bool,
) -> Result<StepOutcome, ReconcileError> {
    let namespace = configuration.provider_namespace();
    let name = configuration.spec.provider_ref.name.clone();
    let requeue = Duration::from_secs(PROVIDER_NOT_READY_REQUEUE_SECS);

    match ctx.store.find::<Provider>(&namespace, &name).await? {
        None => {
            condition(configuration, CONDITION_TYPE_PROVIDER_READY).failure(
                REASON_PROVIDER_MISSING,
                &format!("Provider referenced ({namespace}/{name}) does not exist"),
            );
            if deleting {
                warn!(provider = %name, "Provider missing, infrastructure cannot be destroyed");
                Ok(StepOutcome::Stop)
            } else {
                Ok(StepOutcome::Requeue(requeue))
            }
        }
        Some(provider) if !provider.is_ready() => {
            debug!(provider = %name, "Provider not ready yet");
            condition(configuration, CONDITION_TYPE_PROVIDER_READY)
                .in_progress(&format!("Provider referenced ({namespace}/{name}) is not ready"));
            Ok(StepOutcome::Requeue(requeue))
        }
        Some(provider) => {
            condition(configuration, CONDITION_TYPE_PROVIDER_READY).success("Provider ready");
            state.provider = Some(provider);
            Ok(StepOutcome::Continue)
        }
    }
}
