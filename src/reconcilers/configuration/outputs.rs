// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Folding the terraform state back into status and the connection secret.

use super::{apply_secret, condition, secret_data, PipelineState};
use crate::constants::TERRAFORM_STATE_KEY;
use crate::context::Context;
use crate::crd::Configuration;
use crate::errors::ReconcileError;
use crate::reconcilers::ensure::StepOutcome;
use crate::reconcilers::jobs::configuration_labels;
use crate::status_reasons::{CONDITION_TYPE_READY, REASON_OUTPUT_MISSING};
use crate::store::ObjectStore;
use crate::terraform::State;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Projects terraform outputs into environment style secret data.
///
/// With an allow-list only the listed outputs are projected and a missing one
/// is returned as the error; without one every output is. Keys are upper-cased.
///
/// # Errors
///
/// Returns the first allow-listed key that has no output.
pub fn project_outputs(
    state: &State,
    keys: Option<&[String]>,
) -> Result<BTreeMap<String, String>, String> {
    match keys {
        Some(keys) if !keys.is_empty() => keys
            .iter()
            .map(|key| {
                state
                    .outputs
                    .get(key)
                    .map(|output| (key.to_uppercase(), output.to_env_string()))
                    .ok_or_else(|| key.clone())
            })
            .collect(),
        _ => Ok(state
            .outputs
            .iter()
            .map(|(key, output)| (key.to_uppercase(), output.to_env_string()))
            .collect()),
    }
}

/// Reads the state left by the apply and records the managed resource count.
pub(super) async fn terraform_status<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
    state: &mut PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    let name = configuration.state_secret_name();
    let invalid = |reason: &str| ReconcileError::InvalidArtifact {
        name: name.clone(),
        reason: reason.to_string(),
    };

    let secret = ctx
        .store
        .find::<Secret>(ctx.controller_namespace(), &name)
        .await?
        .ok_or_else(|| invalid("terraform state secret not found"))?;
    let data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(TERRAFORM_STATE_KEY))
        .ok_or_else(|| invalid("terraform state secret has no tfstate key"))?;
    let terraform = State::from_slice(&data.0).map_err(|e| invalid(&e.to_string()))?;

    let resources = i64::try_from(terraform.count_resources()).unwrap_or(i64::MAX);
    debug!(
        namespace = %configuration.namespace().unwrap_or_default(),
        name = %configuration.name_any(),
        resources = resources,
        "Read terraform state"
    );
    configuration
        .status
        .get_or_insert_with(Default::default)
        .resources = Some(resources);
    state.terraform = Some(terraform);
    Ok(StepOutcome::Continue)
}

/// Writes the outputs into `spec.writeConnectionSecretToRef`, owned by the configuration.
pub(super) async fn connection_secret<S: ObjectStore>(
    ctx: &Context<S>,
    configuration: &mut Configuration,
    state: &PipelineState,
) -> Result<StepOutcome, ReconcileError> {
    let Some(sink) = configuration.spec.write_connection_secret_to_ref.clone() else {
        return Ok(StepOutcome::Continue);
    };
    let Some(terraform) = state.terraform.as_ref() else {
        return Ok(StepOutcome::Continue);
    };

    let data = match project_outputs(terraform, sink.keys.as_deref()) {
        Ok(data) => data,
        Err(missing) => {
            warn!(
                namespace = %configuration.namespace().unwrap_or_default(),
                name = %configuration.name_any(),
                output = %missing,
                "Connection secret key has no terraform output"
            );
            condition(configuration, CONDITION_TYPE_READY).failure(
                REASON_OUTPUT_MISSING,
                &format!("Terraform output {missing} does not exist"),
            );
            return Ok(StepOutcome::Stop);
        }
    };

    let namespace = configuration.namespace().unwrap_or_default();
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(sink.name),
            namespace: Some(namespace.clone()),
            labels: Some(configuration_labels(configuration)),
            owner_references: configuration.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        data: Some(secret_data(data)),
        ..Default::default()
    };
    apply_secret(ctx.store.as_ref(), &namespace, secret).await?;
    Ok(StepOutcome::Continue)
}

#[cfg(test)]
#[path = "outputs_tests.rs"]
mod outputs_tests;
