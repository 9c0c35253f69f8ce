// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Terraform state extraction.
//!
//! After an apply the terraform kubernetes backend leaves the state document
//! in the `tfstate-default-<UID>` secret under the `tfstate` key. Only the
//! parts the controller folds back into status are modelled here: the
//! resource list and the output map.
//!
//! # Example
//!
//! ```rust
//! use terranetes::terraform::State;
//!
//! let state = State::from_slice(br#"{
//!     "resources": [{"mode": "managed", "type": "aws_s3_bucket", "instances": [{}]}],
//!     "outputs": {"bucket": {"value": "assets"}}
//! }"#).unwrap();
//!
//! assert_eq!(state.count_resources(), 1);
//! assert_eq!(state.outputs["bucket"].to_env_string(), "assets");
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Mode tag of resources terraform manages (as opposed to `data` sources).
pub const MANAGED_MODE: &str = "managed";

/// Subset of a terraform state document.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct State {
    #[serde(default)]
    pub terraform_version: Option<String>,

    #[serde(default)]
    pub outputs: BTreeMap<String, OutputValue>,

    #[serde(default)]
    pub resources: Vec<StateResource>,
}

/// One entry of the state's resource list.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StateResource {
    #[serde(default)]
    pub mode: String,

    #[serde(default, rename = "type")]
    pub resource_type: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub instances: Vec<Value>,
}

/// An output value; the payload is opaque until stringified.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct OutputValue {
    #[serde(default)]
    pub value: Value,

    #[serde(default)]
    pub sensitive: bool,
}

impl OutputValue {
    /// Renders the value for an environment-style secret.
    ///
    /// Strings are used verbatim, `null` becomes the empty string and any
    /// other value is rendered as compact JSON.
    #[must_use]
    pub fn to_env_string(&self) -> String {
        match &self.value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl State {
    /// Decodes a state document.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the document is malformed.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Number of managed resource instances; data sources are excluded.
    #[must_use]
    pub fn count_resources(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.mode == MANAGED_MODE)
            .map(|r| r.instances.len())
            .sum()
    }
}

#[cfg(test)]
#[path = "terraform_tests.rs"]
mod terraform_tests;
