// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `policy.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::{
        Constraints, DefaultVariables, LabelSelector, ModuleConstraint, PolicySelector,
        PolicySpec,
    };
    use serde_json::json;

    const MODULE: &str = "https://github.com/appvia/terraform-aws-s3?ref=v1.0.0";

    fn policy(name: &str, spec: PolicySpec) -> Policy {
        Policy::new(name, spec)
    }

    fn allow(patterns: &[&str]) -> PolicySpec {
        PolicySpec {
            constraints: Some(Constraints {
                modules: Some(ModuleConstraint {
                    allowed: patterns.iter().map(|p| (*p).to_string()).collect(),
                }),
                checkov: None,
            }),
            ..Default::default()
        }
    }

    fn checkov(checks: &[&str], selector: Option<PolicySelector>) -> PolicySpec {
        PolicySpec {
            constraints: Some(Constraints {
                modules: None,
                checkov: Some(CheckovConstraint {
                    checks: Some(checks.iter().map(|c| (*c).to_string()).collect()),
                    skip_checks: None,
                    selector,
                }),
            }),
            ..Default::default()
        }
    }

    fn prod() -> BTreeMap<String, String> {
        BTreeMap::from([("env".to_string(), "prod".to_string())])
    }

    #[test]
    fn test_no_module_constraints_allows_everything() {
        assert!(module_permitted(&[], MODULE).unwrap());
        assert!(module_permitted(&[policy("empty", PolicySpec::default())], MODULE).unwrap());
    }

    #[test]
    fn test_any_policy_can_allow_the_module() {
        let policies = vec![
            policy("a", allow(&["^https://gitlab.com/.*$"])),
            policy("b", allow(&["^https://github.com/appvia/.*$"])),
        ];
        assert!(module_permitted(&policies, MODULE).unwrap());
        assert!(!module_permitted(&policies[..1], MODULE).unwrap());
    }

    #[test]
    fn test_invalid_module_pattern_names_the_policy() {
        let err = module_permitted(&[policy("broken", allow(&["(unclosed"]))], MODULE).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidPolicy { ref policy, .. } if policy == "broken"));
    }

    #[test]
    fn test_first_selected_checkov_constraint_wins() {
        let staging_only = PolicySelector {
            namespace: Some(LabelSelector {
                match_labels: Some(BTreeMap::from([("env".to_string(), "staging".to_string())])),
                match_expressions: None,
            }),
            modules: None,
        };
        let policies = vec![
            policy("a-staging", checkov(&["CKV_1"], Some(staging_only))),
            policy("b-everything", checkov(&["CKV_2"], None)),
            policy("c-later", checkov(&["CKV_3"], None)),
        ];

        let (name, constraint) = checkov_constraint(&policies, &prod(), MODULE)
            .unwrap()
            .unwrap();
        assert_eq!(name, "b-everything");
        assert_eq!(constraint.checks, Some(vec!["CKV_2".to_string()]));

        assert!(checkov_constraint(&[], &prod(), MODULE).unwrap().is_none());
    }

    #[test]
    fn test_default_variables_follow_selectors() {
        let policies = vec![policy(
            "defaults",
            PolicySpec {
                defaults: Some(vec![
                    DefaultVariables {
                        selector: PolicySelector {
                            namespace: None,
                            modules: Some(vec!["terraform-aws-".to_string()]),
                        },
                        variables: json!({"region": "eu-west-2"}),
                    },
                    DefaultVariables {
                        selector: PolicySelector {
                            namespace: None,
                            modules: Some(vec!["terraform-gcp-".to_string()]),
                        },
                        variables: json!({"project": "infra"}),
                    },
                ]),
                ..Default::default()
            },
        )];

        let variables = default_variables(&policies, &prod(), MODULE).unwrap();
        assert_eq!(variables, vec![&json!({"region": "eu-west-2"})]);
    }

    #[test]
    fn test_checkov_failures() {
        assert_eq!(
            checkov_failures(br#"{"summary": {"passed": 10, "failed": 0}}"#).unwrap(),
            0
        );
        assert_eq!(
            checkov_failures(
                br#"[{"summary": {"failed": 2}}, {"summary": {"failed": 1}}, {"results": {}}]"#
            )
            .unwrap(),
            3
        );
        assert!(checkov_failures(b"<html>").is_err());
    }
}
