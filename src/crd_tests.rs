// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use crate::crd::*;
    use crate::labels::{APPLY_ANNOTATION, ORPHAN_ANNOTATION};
    use kube::core::ObjectMeta;
    use kube::CustomResourceExt;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn configuration(annotations: &[(&str, &str)]) -> Configuration {
        let mut configuration = Configuration::new(
            "bucket",
            ConfigurationSpec {
                module: "https://github.com/appvia/terraform-aws-s3".to_string(),
                provider_ref: ProviderReference {
                    name: "aws".to_string(),
                    namespace: None,
                },
                ..Default::default()
            },
        );
        configuration.metadata = ObjectMeta {
            name: Some("bucket".to_string()),
            namespace: Some("apps".to_string()),
            uid: Some("1234-abcd".to_string()),
            generation: Some(3),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        };
        configuration
    }

    #[test]
    fn test_derived_secret_names() {
        let configuration = configuration(&[]);
        assert_eq!(configuration.config_secret_name(), "config-1234-abcd");
        assert_eq!(configuration.state_secret_name(), "tfstate-default-1234-abcd");
        assert_eq!(configuration.policy_secret_name(), "policy-1234-abcd");
        assert_eq!(configuration.cost_secret_name(), "costs-1234-abcd");
        assert_eq!(configuration.auth_secret_name(), "auth-1234-abcd");
    }

    #[test]
    fn test_generation_defaults_to_zero() {
        let mut configuration = configuration(&[]);
        assert_eq!(configuration.generation(), 3);
        configuration.metadata.generation = None;
        assert_eq!(configuration.generation(), 0);
    }

    #[test]
    fn test_approval_annotation() {
        assert_eq!(configuration(&[]).approval(), Approval::Default);
        assert_eq!(
            configuration(&[(APPLY_ANNOTATION, "true")]).approval(),
            Approval::Approved
        );
        assert_eq!(
            configuration(&[(APPLY_ANNOTATION, "false")]).approval(),
            Approval::Withheld
        );
        assert_eq!(
            configuration(&[(APPLY_ANNOTATION, "yes")]).approval(),
            Approval::Default
        );
    }

    #[test]
    fn test_orphan_annotation() {
        assert!(!configuration(&[]).is_orphaned());
        assert!(configuration(&[(ORPHAN_ANNOTATION, "true")]).is_orphaned());
        assert!(!configuration(&[(ORPHAN_ANNOTATION, "false")]).is_orphaned());
    }

    #[test]
    fn test_provider_namespace_defaults_to_own() {
        let mut configuration = configuration(&[]);
        assert_eq!(configuration.provider_namespace(), "apps");
        configuration.spec.provider_ref.namespace = Some("terraform-system".to_string());
        assert_eq!(configuration.provider_namespace(), "terraform-system");
    }

    #[test]
    fn test_spec_wire_format() {
        let spec: ConfigurationSpec = serde_json::from_value(json!({
            "module": "https://github.com/appvia/terraform-aws-s3",
            "providerRef": {"name": "aws"},
            "variables": {"bucket": {"versioning": true}},
            "writeConnectionSecretToRef": {"name": "outputs", "keys": ["bucket_arn"]},
            "enableAutoApproval": true
        }))
        .unwrap();

        assert!(spec.enable_auto_approval);
        assert_eq!(spec.variables.unwrap()["bucket"]["versioning"], true);
        assert_eq!(
            spec.write_connection_secret_to_ref.unwrap().keys,
            Some(vec!["bucket_arn".to_string()])
        );
        assert!(spec.auth.is_none());
    }

    #[test]
    fn test_status_flattens_common_fields() {
        let status = ConfigurationStatus {
            common: CommonStatus {
                conditions: vec![Condition {
                    r#type: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            resources: Some(2),
            costs: Some(CostStatus {
                enabled: false,
                ..Default::default()
            }),
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["conditions"][0]["type"], "Ready");
        assert_eq!(value["resources"], 2);
        assert_eq!(value["costs"], json!({"enabled": false}));
        assert!(status.common.is_true("Ready"));
        assert!(!status.common.is_true("TerraformApply"));
    }

    #[test]
    fn test_provider_readiness() {
        let mut provider = Provider::new("aws", ProviderSpec::default());
        assert!(!provider.is_ready());

        provider.status = Some(ProviderStatus {
            common: CommonStatus {
                conditions: vec![Condition {
                    r#type: "Ready".to_string(),
                    status: "False".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
        });
        assert!(!provider.is_ready());

        provider.common_status_mut().conditions[0].status = "True".to_string();
        assert!(provider.is_ready());
    }

    #[test]
    fn test_crd_scopes() {
        let configuration = Configuration::crd();
        assert_eq!(configuration.spec.group, "terraform.appvia.io");
        assert_eq!(configuration.spec.scope, "Namespaced");
        assert_eq!(Provider::crd().spec.scope, "Namespaced");
        assert_eq!(Policy::crd().spec.scope, "Cluster");
        assert_eq!(configuration.spec.versions[0].name, "v1alpha1");
    }

    #[test]
    fn test_policy_wire_format() {
        let spec: PolicySpec = serde_json::from_value(json!({
            "constraints": {
                "modules": {"allowed": ["^https://github.com/appvia/.*$"]},
                "checkov": {"checks": ["CKV_AWS_18"], "skipChecks": ["CKV_AWS_21"]}
            },
            "defaults": [{
                "selector": {"modules": [".*s3.*"]},
                "variables": {"tags": {"team": "platform"}}
            }]
        }))
        .unwrap();

        let constraints = spec.constraints.unwrap();
        assert_eq!(constraints.modules.unwrap().allowed.len(), 1);
        let checkov = constraints.checkov.unwrap();
        assert_eq!(checkov.skip_checks, Some(vec!["CKV_AWS_21".to_string()]));
        assert!(checkov.selector.is_none());
        assert_eq!(spec.defaults.unwrap()[0].variables["tags"]["team"], "platform");
    }
}
