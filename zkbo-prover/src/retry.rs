use std::future::Future;

use tracing::warn;
use zkbo_common::RetryPolicy;

/// Run `op` until it succeeds, fails permanently or the policy runs out of
/// attempts. Returns the last result and the number of attempts made.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> (Result<T, E>, u32)
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return (Ok(value), attempt),
            Err(err) if attempt < attempts && is_transient(&err) => {
                let delay = policy.backoff(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label, attempt, attempts, err, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return (Err(err), attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = with_retry(
            &policy(),
            "op",
            |e: &TestError| matches!(e, TestError::Flaky),
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Flaky)
                } else {
                    Ok(7)
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = with_retry(
            &policy(),
            "op",
            |e: &TestError| matches!(e, TestError::Flaky),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError::Fatal)
            },
        )
        .await;
        assert!(matches!(result, Err(TestError::Fatal)));
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let (result, attempts) = with_retry(
            &policy(),
            "op",
            |_: &TestError| true,
            || async { Err::<(), _>(TestError::Flaky) },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 3);
    }
}
