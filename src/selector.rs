// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Selector matching utilities.
//!
//! Policies select configurations by the labels of their namespace and by
//! regular expressions over the module source. This module evaluates both, and
//! maps stage jobs back to the `Configuration` that owns them for the job
//! watch.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use terranetes::crd::LabelSelector;
//! use terranetes::selector::matches_selector;
//!
//! let selector = LabelSelector {
//!     match_labels: Some(BTreeMap::from([("env".to_string(), "prod".to_string())])),
//!     match_expressions: None,
//! };
//! let labels = BTreeMap::from([("env".to_string(), "prod".to_string())]);
//! assert!(matches_selector(&selector, &labels));
//! ```

use crate::crd::{Configuration, LabelSelector, LabelSelectorRequirement, PolicySelector};
use crate::labels::{CONFIGURATION_NAMESPACE_LABEL, CONFIGURATION_NAME_LABEL};
use k8s_openapi::api::batch::v1::Job;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use regex::Regex;
use std::collections::BTreeMap;

fn requirement_matches(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> bool {
    let values = requirement.values.as_deref().unwrap_or_default();
    let value = labels.get(&requirement.key);
    match requirement.operator.as_str() {
        "In" => value.is_some_and(|v| values.contains(v)),
        "NotIn" => value.is_none_or(|v| !values.contains(v)),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        _ => false,
    }
}

/// True when `labels` satisfy every `matchLabels` entry and every
/// `matchExpressions` requirement. An empty selector matches everything.
#[must_use]
pub fn matches_selector(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector
        .match_labels
        .as_ref()
        .is_none_or(|wanted| wanted.iter().all(|(k, v)| labels.get(k) == Some(v)));

    let expressions_match = selector
        .match_expressions
        .as_ref()
        .is_none_or(|reqs| reqs.iter().all(|r| requirement_matches(r, labels)));

    labels_match && expressions_match
}

/// True when any of `patterns` matches `module`.
///
/// # Errors
///
/// Returns the compile error of the first invalid pattern.
pub fn matches_any(patterns: &[String], module: &str) -> Result<bool, regex::Error> {
    for pattern in patterns {
        if Regex::new(pattern)?.is_match(module) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Evaluates a policy selector against a configuration's namespace labels and module.
///
/// # Errors
///
/// Returns the compile error of an invalid module pattern.
pub fn matches_policy_selector(
    selector: &PolicySelector,
    namespace_labels: &BTreeMap<String, String>,
    module: &str,
) -> Result<bool, regex::Error> {
    if let Some(namespace) = &selector.namespace {
        if !matches_selector(namespace, namespace_labels) {
            return Ok(false);
        }
    }
    match &selector.modules {
        Some(patterns) if !patterns.is_empty() => matches_any(patterns, module),
        _ => Ok(true),
    }
}

/// Maps a stage job back to its `Configuration` through the job labels.
#[must_use]
pub fn configuration_for_job(job: &Job) -> Option<ObjectRef<Configuration>> {
    let labels = job.labels();
    let name = labels.get(CONFIGURATION_NAME_LABEL)?;
    let namespace = labels.get(CONFIGURATION_NAMESPACE_LABEL)?;
    Some(ObjectRef::new(name).within(namespace))
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
