// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status_reasons` module
//!
//! Condition types and reasons are part of the resource API; these tests pin
//! their wire values.

#[cfg(test)]
mod tests {
    use crate::status_reasons::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_condition_types() {
        assert_eq!(CONDITION_TYPE_READY, "Ready");
        assert_eq!(CONDITION_TYPE_PROVIDER_READY, "ProviderReady");
        assert_eq!(CONDITION_TYPE_TERRAFORM_PLAN, "TerraformPlan");
        assert_eq!(CONDITION_TYPE_TERRAFORM_POLICY, "TerraformPolicy");
        assert_eq!(CONDITION_TYPE_TERRAFORM_APPLY, "TerraformApply");
        assert_eq!(CONDITION_TYPE_TERRAFORM_DESTROY, "TerraformDestroy");
    }

    #[test]
    fn test_configuration_conditions_start_with_ready() {
        assert_eq!(CONFIGURATION_CONDITIONS.first(), Some(&CONDITION_TYPE_READY));
        let unique: BTreeSet<_> = CONFIGURATION_CONDITIONS.iter().collect();
        assert_eq!(unique.len(), CONFIGURATION_CONDITIONS.len());
        assert!(!CONFIGURATION_CONDITIONS.contains(&CONDITION_TYPE_TERRAFORM_DESTROY));
    }

    #[test]
    fn test_status_values() {
        assert_eq!(STATUS_TRUE, "True");
        assert_eq!(STATUS_FALSE, "False");
        assert_eq!(STATUS_UNKNOWN, "Unknown");
    }

    #[test]
    fn test_generic_reasons() {
        assert_eq!(REASON_READY, "Ready");
        assert_eq!(REASON_IN_PROGRESS, "InProgress");
        assert_eq!(REASON_ERROR, "Error");
        assert_eq!(REASON_ACTION_REQUIRED, "ActionRequired");
        assert_eq!(REASON_NOT_DETERMINED, "NotDetermined");
    }

    #[test]
    fn test_pipeline_reasons_are_distinct() {
        let reasons = [
            REASON_APPROVAL_PENDING,
            REASON_APPROVAL_WITHHELD,
            REASON_MODULE_NOT_ALLOWED,
            REASON_POLICY_FAILED,
            REASON_OUTPUT_MISSING,
            REASON_PROVIDER_MISSING,
            REASON_DESTROY_SKIPPED,
        ];
        let unique: BTreeSet<_> = reasons.iter().collect();
        assert_eq!(unique.len(), reasons.len());
        for reason in reasons {
            assert!(
                reason.chars().next().is_some_and(char::is_uppercase),
                "{reason} is CamelCase"
            );
            assert!(!reason.contains(' '));
        }
    }
}
