// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Evaluation of cluster `Policy` objects against a configuration.
//!
//! Policies are read-only inputs. Every function here takes the policy list
//! already sorted by name, so "first matching policy" is deterministic.

use crate::crd::{CheckovConstraint, Policy};
use crate::errors::ReconcileError;
use crate::selector::{matches_any, matches_policy_selector};
use kube::ResourceExt;
use serde_json::Value;
use std::collections::BTreeMap;

fn invalid(policy: &Policy, error: &regex::Error) -> ReconcileError {
    ReconcileError::InvalidPolicy {
        policy: policy.name_any(),
        reason: error.to_string(),
    }
}

/// True when the module source is allowed.
///
/// Only policies with a non-empty `constraints.modules.allowed` list take
/// part; with none of them every module is allowed, otherwise at least one
/// pattern of one policy has to match.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidPolicy`] for a pattern that does not compile.
pub fn module_permitted(policies: &[Policy], module: &str) -> Result<bool, ReconcileError> {
    let mut restricted = false;
    for policy in policies {
        let Some(constraint) = policy
            .spec
            .constraints
            .as_ref()
            .and_then(|c| c.modules.as_ref())
        else {
            continue;
        };
        if constraint.allowed.is_empty() {
            continue;
        }
        restricted = true;
        if matches_any(&constraint.allowed, module).map_err(|e| invalid(policy, &e))? {
            return Ok(true);
        }
    }
    Ok(!restricted)
}

/// The checkov constraint of the first policy selecting the configuration,
/// with the name of that policy.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidPolicy`] for a module pattern that does not compile.
pub fn checkov_constraint(
    policies: &[Policy],
    namespace_labels: &BTreeMap<String, String>,
    module: &str,
) -> Result<Option<(String, CheckovConstraint)>, ReconcileError> {
    for policy in policies {
        let Some(constraint) = policy
            .spec
            .constraints
            .as_ref()
            .and_then(|c| c.checkov.as_ref())
        else {
            continue;
        };
        let selected = match &constraint.selector {
            None => true,
            Some(selector) => matches_policy_selector(selector, namespace_labels, module)
                .map_err(|e| invalid(policy, &e))?,
        };
        if selected {
            return Ok(Some((policy.name_any(), constraint.clone())));
        }
    }
    Ok(None)
}

/// Variables of every default whose selector matches, in policy order.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidPolicy`] for a module pattern that does not compile.
pub fn default_variables<'a>(
    policies: &'a [Policy],
    namespace_labels: &BTreeMap<String, String>,
    module: &str,
) -> Result<Vec<&'a Value>, ReconcileError> {
    let mut variables = Vec::new();
    for policy in policies {
        for default in policy.spec.defaults.iter().flatten() {
            if matches_policy_selector(&default.selector, namespace_labels, module)
                .map_err(|e| invalid(policy, &e))?
            {
                variables.push(&default.variables);
            }
        }
    }
    Ok(variables)
}

/// Number of failed checks in a checkov JSON report.
///
/// Checkov writes a single summary object for one framework and a list of
/// them for several.
///
/// # Errors
///
/// Returns the JSON error when the report is malformed.
pub fn checkov_failures(report: &[u8]) -> Result<u64, serde_json::Error> {
    let value: Value = serde_json::from_slice(report)?;
    let failed = |v: &Value| v["summary"]["failed"].as_u64().unwrap_or(0);
    Ok(match &value {
        Value::Array(reports) => reports.iter().map(failed).sum(),
        report => failed(report),
    })
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod policy_tests;
