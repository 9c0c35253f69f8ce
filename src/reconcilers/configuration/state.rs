// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use crate::crd::{CheckovConstraint, Policy, Provider};
use crate::terraform::State;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeMap;

/// Context threaded between the steps of one configuration pass.
///
/// Built empty for every pass and dropped at the end of it; nothing here
/// survives into the next reconcile.
#[derive(Default)]
pub struct PipelineState {
    /// Every policy in the cluster, sorted by name.
    pub policies: Vec<Policy>,

    /// Labels of the configuration's namespace, for policy selectors.
    pub namespace_labels: BTreeMap<String, String>,

    /// Jobs carrying the configuration's UID label, current generation only
    /// once stale jobs have been removed.
    pub jobs: Vec<Job>,

    pub provider: Option<Provider>,

    /// The `auth-<UID>` copy of the authentication secret.
    pub auth: Option<Secret>,

    /// Checkov constraint resolved from the policies, with the policy name.
    pub checkov: Option<(String, CheckovConstraint)>,

    /// Job template source, built-in or from the override ConfigMap.
    pub job_template: Option<String>,

    /// Terraform state read after the apply stage.
    pub terraform: Option<State>,
}
