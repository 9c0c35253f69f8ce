// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `terraform.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;

    #[test]
    fn test_count_resources_skips_data_sources() {
        let state: State = serde_json::from_value(json!({
            "resources": [
                {"mode": "managed", "type": "aws_s3_bucket", "instances": [{"i": 1}, {"i": 2}]},
                {"mode": "data", "type": "aws_caller_identity", "instances": [{"i": 1}]}
            ]
        }))
        .unwrap();

        assert_eq!(state.count_resources(), 2);
    }

    #[test]
    fn test_empty_state_has_nothing() {
        let state = State::from_slice(b"{}").unwrap();
        assert_eq!(state.count_resources(), 0);
        assert!(state.outputs.is_empty());
    }

    #[test]
    fn test_output_stringification() {
        let state = State::from_slice(
            br#"{"outputs": {
                "A": {"value": "x"},
                "B": {"value": null},
                "C": {"value": 3},
                "D": {"value": ["a", "b"], "sensitive": true}
            }}"#,
        )
        .unwrap();

        assert_eq!(state.outputs.len(), 4);
        assert_eq!(state.outputs["A"].to_env_string(), "x");
        assert_eq!(state.outputs["B"].to_env_string(), "");
        assert_eq!(state.outputs["C"].to_env_string(), "3");
        assert_eq!(state.outputs["D"].to_env_string(), r#"["a","b"]"#);
        assert!(state.outputs["D"].sensitive);
    }

    #[test]
    fn test_missing_value_is_null() {
        let state = State::from_slice(br#"{"outputs": {"A": {}}}"#).unwrap();
        assert_eq!(state.outputs["A"].to_env_string(), "");
    }

    #[test]
    fn test_malformed_state_is_an_error() {
        assert!(State::from_slice(b"not json").is_err());
    }
}
