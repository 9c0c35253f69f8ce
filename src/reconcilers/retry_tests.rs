// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::{default_backoff, error_backoff, is_retryable_error, retry_api_call};
    use kube::core::Status;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(
            Status::failure(&format!("{reason} from test"), reason)
                .with_code(code)
                .boxed(),
        )
    }

    #[test]
    fn test_backoff_configuration() {
        let backoff = default_backoff();

        assert_eq!(backoff.initial_interval, Duration::from_millis(100));
        assert_eq!(backoff.max_interval, Duration::from_secs(30));
        assert_eq!(backoff.max_elapsed_time, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_next_backoff_stays_within_jitter_and_grows() {
        let mut backoff = default_backoff();

        let first = backoff.next_backoff().unwrap();
        assert!(first >= Duration::from_millis(90) && first <= Duration::from_millis(110));

        let second = backoff.next_backoff().unwrap();
        assert!(second >= Duration::from_millis(180) && second <= Duration::from_millis(220));
    }

    #[test]
    fn test_interval_caps_at_max() {
        let mut backoff = default_backoff();
        for _ in 0..20 {
            backoff.next_backoff();
        }
        assert_eq!(backoff.current_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_error_backoff_never_gives_up() {
        let mut backoff = error_backoff();
        assert_eq!(backoff.initial_interval, Duration::from_secs(30));
        assert_eq!(backoff.max_interval, Duration::from_secs(900));
        assert!(backoff.max_elapsed_time.is_none());

        for _ in 0..20 {
            assert!(backoff.next_backoff().is_some());
        }
        assert_eq!(backoff.current_interval, Duration::from_secs(900));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable_error(&api_error(429, "TooManyRequests")));
        assert!(is_retryable_error(&api_error(500, "InternalError")));
        assert!(is_retryable_error(&api_error(503, "ServiceUnavailable")));

        assert!(!is_retryable_error(&api_error(404, "NotFound")));
        assert!(!is_retryable_error(&api_error(409, "Conflict")));
        assert!(!is_retryable_error(&api_error(409, "AlreadyExists")));
        assert!(!is_retryable_error(&api_error(422, "Invalid")));
    }

    #[test]
    fn test_service_errors_retryable() {
        let service_error: Box<dyn std::error::Error + Send + Sync> = Box::new(
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Connection failed"),
        );

        assert!(is_retryable_error(&kube::Error::Service(service_error)));
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_on_first_attempt() {
        let attempts = AtomicUsize::new(0);

        let result: Result<(), kube::Error> = retry_api_call(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(api_error(409, "Conflict")) }
            },
            "patch configuration",
        )
        .await;

        assert!(matches!(result, Err(kube::Error::Api(ref e)) if e.code == 409));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_until_success() {
        let attempts = AtomicUsize::new(0);

        let result = retry_api_call(
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(api_error(503, "ServiceUnavailable"))
                    } else {
                        Ok(n)
                    }
                }
            },
            "get configuration",
        )
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
