// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `outputs.rs`

#[cfg(test)]
mod tests {
    use super::super::*;

    fn state() -> State {
        State::from_slice(br#"{"outputs": {"A": {"value": "x"}, "B": {"value": null}}}"#).unwrap()
    }

    #[test]
    fn test_allow_list_projects_only_listed_keys() {
        let data = project_outputs(&state(), Some(&["A".to_string()][..])).unwrap();
        assert_eq!(data, BTreeMap::from([("A".to_string(), "x".to_string())]));
    }

    #[test]
    fn test_no_allow_list_projects_everything() {
        let data = project_outputs(&state(), None).unwrap();
        assert_eq!(
            data,
            BTreeMap::from([
                ("A".to_string(), "x".to_string()),
                ("B".to_string(), String::new()),
            ])
        );
        assert_eq!(project_outputs(&state(), Some(&[][..])).unwrap(), data);
    }

    #[test]
    fn test_keys_are_upper_cased() {
        let state =
            State::from_slice(br#"{"outputs": {"bucket_arn": {"value": "arn:aws:s3:::a"}}}"#)
                .unwrap();
        let data = project_outputs(&state, None).unwrap();
        assert_eq!(data["BUCKET_ARN"], "arn:aws:s3:::a");
    }

    #[test]
    fn test_missing_allow_listed_key() {
        assert_eq!(
            project_outputs(&state(), Some(&["A".to_string(), "C".to_string()][..])),
            Err("C".to_string())
        );
    }
}
