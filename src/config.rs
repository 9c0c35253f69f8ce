// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration.
//!
//! Every option is a command line flag that can also be supplied through an
//! environment variable, so the same binary runs unchanged from a Helm chart
//! (env) or a terminal (flags).

use crate::constants::{
    DEFAULT_CONTROLLER_NAMESPACE, DEFAULT_EXECUTOR_IMAGE, DEFAULT_EXECUTOR_SERVICE_ACCOUNT,
    DEFAULT_INFRACOST_IMAGE, DEFAULT_POLICY_IMAGE, DEFAULT_RECONCILE_TIMEOUT_SECS,
    DEFAULT_RESYNC_PERIOD_SECS, DEFAULT_TERRAFORM_IMAGE, METRICS_SERVER_PORT,
};
use clap::Parser;
use std::time::Duration;

/// Runtime options of the terraform controller.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
#[command(name = "terranetes-controller", version, about, long_about = None)]
pub struct ControllerConfig {
    /// Namespace the stage jobs and generated secrets live in.
    #[arg(long, env = "KUBE_NAMESPACE", default_value = DEFAULT_CONTROLLER_NAMESPACE)]
    pub namespace: String,

    /// Image used to fetch modules and run helper commands inside the jobs.
    #[arg(long, env = "EXECUTOR_IMAGE", default_value = DEFAULT_EXECUTOR_IMAGE)]
    pub executor_image: String,

    /// Terraform image used by the plan, apply and destroy stages.
    #[arg(long, env = "TERRAFORM_IMAGE", default_value = DEFAULT_TERRAFORM_IMAGE)]
    pub terraform_image: String,

    /// Infracost image used for cost estimation.
    #[arg(long, env = "INFRACOST_IMAGE", default_value = DEFAULT_INFRACOST_IMAGE)]
    pub infracost_image: String,

    /// Checkov image used by the verify stage.
    #[arg(long, env = "POLICY_IMAGE", default_value = DEFAULT_POLICY_IMAGE)]
    pub policy_image: String,

    /// Secret holding the infracost API token; setting it enables cost estimation.
    #[arg(long, env = "COST_SECRET")]
    pub cost_secret: Option<String>,

    /// ConfigMap (key `job.yaml`) overriding the built-in job template.
    #[arg(long, env = "JOB_TEMPLATE")]
    pub job_template: Option<String>,

    /// Honour `spec.terraformVersion` on configurations.
    #[arg(long, env = "ENABLE_TERRAFORM_VERSIONS", default_value_t = false)]
    pub enable_terraform_versions: bool,

    /// Seconds between full resyncs of a resource.
    #[arg(long, env = "RESYNC_PERIOD_SECS", default_value_t = DEFAULT_RESYNC_PERIOD_SECS)]
    pub resync_period_secs: u64,

    /// Deadline of a single reconcile pass in seconds.
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value_t = DEFAULT_RECONCILE_TIMEOUT_SECS)]
    pub reconcile_timeout_secs: u64,

    /// Port of the Prometheus metrics server.
    #[arg(long, env = "METRICS_PORT", default_value_t = METRICS_SERVER_PORT)]
    pub metrics_port: u16,

    /// Service account the stage jobs run as.
    #[arg(long, env = "EXECUTOR_SERVICE_ACCOUNT", default_value = DEFAULT_EXECUTOR_SERVICE_ACCOUNT)]
    pub executor_service_account: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            executor_image: DEFAULT_EXECUTOR_IMAGE.to_string(),
            terraform_image: DEFAULT_TERRAFORM_IMAGE.to_string(),
            infracost_image: DEFAULT_INFRACOST_IMAGE.to_string(),
            policy_image: DEFAULT_POLICY_IMAGE.to_string(),
            cost_secret: None,
            job_template: None,
            enable_terraform_versions: false,
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            metrics_port: METRICS_SERVER_PORT,
            executor_service_account: DEFAULT_EXECUTOR_SERVICE_ACCOUNT.to_string(),
        }
    }
}

impl ControllerConfig {
    /// True when cost estimation is enabled cluster wide.
    #[must_use]
    pub fn cost_estimation_enabled(&self) -> bool {
        self.cost_secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    #[must_use]
    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    #[must_use]
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Terraform image, with the tag replaced by `version` when overrides are enabled.
    #[must_use]
    pub fn terraform_image_for(&self, version: Option<&str>) -> String {
        match version {
            Some(version) if self.enable_terraform_versions && !version.is_empty() => {
                let repository = self
                    .terraform_image
                    .rsplit_once(':')
                    .filter(|(_, tag)| !tag.contains('/'))
                    .map_or(self.terraform_image.as_str(), |(repo, _)| repo);
                format!("{repository}:{version}")
            }
            _ => self.terraform_image.clone(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
