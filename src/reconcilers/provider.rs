// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `Provider` reconciliation.
//!
//! A provider has a single check: its credentials secret must exist. Once it
//! does, the ensure runner marks the provider `Ready`, which is what the
//! configuration pipeline waits for.

use crate::constants::MISSING_SECRET_REQUEUE_SECS;
use crate::context::Context;
use crate::crd::{HasCommonStatus, Provider};
use crate::errors::ReconcileError;
use crate::reconcilers::ensure::{Pipeline, ReconcileResult, StepOutcome};
use crate::reconcilers::status::ConditionTracker;
use crate::status_reasons::{CONDITION_TYPE_READY, REASON_ACTION_REQUIRED};
use crate::store::ObjectStore;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderStep {
    CredentialsSecret,
}

impl fmt::Display for ProviderStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderStep::CredentialsSecret => f.write_str("credentials-secret"),
        }
    }
}

pub struct ProviderPipeline<S> {
    ctx: Arc<Context<S>>,
}

impl<S: ObjectStore> ProviderPipeline<S> {
    pub fn new(ctx: Arc<Context<S>>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl<S: ObjectStore> Pipeline for ProviderPipeline<S> {
    type Resource = Provider;
    type Step = ProviderStep;
    type State = ();

    fn steps(&self) -> &[ProviderStep] {
        &[ProviderStep::CredentialsSecret]
    }

    async fn ensure(
        &self,
        step: ProviderStep,
        provider: &mut Provider,
        _state: &mut (),
    ) -> Result<StepOutcome, ReconcileError> {
        match step {
            ProviderStep::CredentialsSecret => credentials_secret(&self.ctx, provider).await,
        }
    }
}

async fn credentials_secret<S: ObjectStore>(
    ctx: &Context<S>,
    provider: &mut Provider,
) -> Result<StepOutcome, ReconcileError> {
    let reference = &provider.spec.secret_ref;
    let namespace = reference
        .namespace
        .clone()
        .unwrap_or_else(|| provider.namespace().unwrap_or_default());
    let name = reference.name.clone();

    if ctx.store.find::<Secret>(&namespace, &name).await?.is_some() {
        debug!(
            provider = %provider.name_any(),
            secret = %format!("{namespace}/{name}"),
            "Provider credentials present"
        );
        return Ok(StepOutcome::Continue);
    }

    warn!(
        provider = %provider.name_any(),
        secret = %format!("{namespace}/{name}"),
        "Provider credentials secret is missing"
    );
    let generation = provider.metadata.generation.unwrap_or(0);
    ConditionTracker::new(
        provider.common_status_mut(),
        CONDITION_TYPE_READY,
        generation,
    )
    .failure(
        REASON_ACTION_REQUIRED,
        &format!("Provider secret ({namespace}/{name}) not found"),
    );
    Ok(StepOutcome::Requeue(Duration::from_secs(
        MISSING_SECRET_REQUEUE_SECS,
    )))
}

/// Reconciles one `Provider`.
///
/// # Errors
///
/// Returns the store error of the secret lookup or the status write.
pub async fn reconcile_provider<S: ObjectStore>(
    ctx: Arc<Context<S>>,
    provider: Provider,
) -> Result<ReconcileResult, ReconcileError> {
    debug!(
        namespace = %provider.namespace().unwrap_or_default(),
        name = %provider.name_any(),
        "Reconciling Provider"
    );
    let pipeline = ProviderPipeline::new(ctx.clone());
    ctx.runner.run(&pipeline, provider).await
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod provider_tests;
