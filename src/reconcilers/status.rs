// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for Kubernetes resources.
//!
//! Kubernetes conditions follow a standard format:
//! - `type`: The aspect of the resource being reported (e.g., "Ready", "TerraformPlan")
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp when the status last flipped
//!
//! Pipeline steps never build conditions by hand; they go through a
//! [`ConditionTracker`], which refreshes reason and message on every call but
//! only moves `lastTransitionTime` when the status value changes.
//!
//! # Example
//!
//! ```rust
//! use terranetes::crd::CommonStatus;
//! use terranetes::reconcilers::status::ConditionTracker;
//!
//! let mut status = CommonStatus::default();
//! ConditionTracker::new(&mut status, "TerraformPlan", 1).in_progress("Terraform plan is running");
//! ConditionTracker::new(&mut status, "TerraformPlan", 1).success("Terraform plan is complete");
//! assert!(status.is_true("TerraformPlan"));
//! ```

use crate::crd::{CommonStatus, Condition};
use crate::status_reasons::{
    REASON_ACTION_REQUIRED, REASON_IN_PROGRESS, REASON_NOT_DETERMINED, REASON_READY,
    STATUS_FALSE, STATUS_TRUE, STATUS_UNKNOWN,
};
use chrono::Utc;

/// Create a new Kubernetes condition with the current timestamp.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        observed_generation: None,
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Find a condition by type in a list of conditions.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition in a mutable conditions list (in-memory, no API call).
///
/// The `lastTransitionTime` is preserved when the status value is unchanged and
/// set to now when it flips. The runner persists the list at the end of the pass.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        let last_transition_time = if existing.status == status {
            existing
                .last_transition_time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339())
        } else {
            Utc::now().to_rfc3339()
        };

        existing.status = status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.last_transition_time = Some(last_transition_time);
    } else {
        conditions.push(create_condition(condition_type, status, reason, message));
    }
}

/// Registers every type in `types` that is missing as `Unknown`/`NotDetermined`.
pub fn register_conditions(status: &mut CommonStatus, types: &[&str], generation: i64) {
    for condition_type in types {
        if find_condition(&status.conditions, condition_type).is_none() {
            let mut condition = create_condition(
                condition_type,
                STATUS_UNKNOWN,
                REASON_NOT_DETERMINED,
                "",
            );
            condition.observed_generation = Some(generation);
            status.conditions.push(condition);
        }
    }
}

/// Writes one named condition of a [`CommonStatus`].
pub struct ConditionTracker<'a> {
    status: &'a mut CommonStatus,
    condition_type: &'a str,
    generation: i64,
}

impl<'a> ConditionTracker<'a> {
    pub fn new(status: &'a mut CommonStatus, condition_type: &'a str, generation: i64) -> Self {
        Self {
            status,
            condition_type,
            generation,
        }
    }

    fn set(&mut self, status: &str, reason: &str, message: &str) {
        update_condition_in_memory(
            &mut self.status.conditions,
            self.condition_type,
            status,
            reason,
            message,
        );
        if let Some(condition) = self
            .status
            .conditions
            .iter_mut()
            .find(|c| c.r#type == self.condition_type)
        {
            condition.observed_generation = Some(self.generation);
        }
    }

    /// The condition holds.
    pub fn success(&mut self, message: &str) {
        self.set(STATUS_TRUE, REASON_READY, message);
    }

    /// The condition failed with a specific reason.
    pub fn failure(&mut self, reason: &str, message: &str) {
        self.set(STATUS_FALSE, reason, message);
    }

    /// Work towards the condition is underway.
    pub fn in_progress(&mut self, message: &str) {
        self.set(STATUS_FALSE, REASON_IN_PROGRESS, message);
    }

    /// A human has to act before the condition can progress.
    pub fn action_required(&mut self, message: &str) {
        self.set(STATUS_FALSE, REASON_ACTION_REQUIRED, message);
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
