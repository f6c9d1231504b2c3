//! Small shared runtime pieces: cancellation token and bounded retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation flag shared between the CLI signal handler and
/// the worker pool. Checked between units of work; never preempts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Run `op` up to `1 + retries` times with exponential backoff, starting at
/// `initial_backoff`. Transient failures are logged at WARN with `what`.
pub fn with_retry<T, E: std::fmt::Display>(
    what: &str,
    retries: u32,
    initial_backoff: Duration,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let mut backoff = initial_backoff;
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retries => {
                attempt += 1;
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}",
                    what,
                    attempt,
                    retries + 1,
                    err
                );
                std::thread::sleep(backoff);
                backoff *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Default per-call timeout for remote backends.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default initial backoff between retries.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Default retry budget for backend calls.
pub const BACKEND_RETRIES: u32 = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_succeeds_after_failures() {
        let mut calls = 0;
        let result: Result<u32, String> =
            with_retry("op", 2, Duration::from_millis(1), || {
                calls += 1;
                if calls < 3 {
                    Err("transient".to_string())
                } else {
                    Ok(42)
                }
            });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_gives_up() {
        let mut calls = 0;
        let result: Result<u32, String> =
            with_retry("op", 1, Duration::from_millis(1), || {
                calls += 1;
                Err("down".to_string())
            });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
