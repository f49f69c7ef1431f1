//! Document handle consumed by the harness
//!
//! The engine never talks to a browser directly. Everything it needs from the
//! page under test goes through [`Page`]: resolving an address to an element,
//! reading and writing values, clicks, keys and bounded waits. Waits are the
//! only place a page implementation may suspend for longer than one round trip.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tablewright_common::{Address, Error, Result, WaitState};
use tracing::trace;

/// Handle to the live document of one session
#[async_trait]
pub trait Page: Send + Sync {
    /// Wait until the first element matching `address` reaches `state`.
    ///
    /// Fails with [`Error::WaitTimeout`] when the state is not reached in time.
    async fn wait_for(&self, address: &Address, state: WaitState, timeout: Duration) -> Result<()>;

    /// Number of elements currently matching `address`
    async fn count(&self, address: &Address) -> Result<usize>;

    /// Current value of an input, or the trimmed text of any other element
    async fn read_value(&self, address: &Address) -> Result<String>;

    /// Replace the element's value atomically
    async fn set_value(&self, address: &Address, value: &str) -> Result<()>;

    /// Select the option of a select element whose value or label matches
    async fn select_option(&self, address: &Address, value: &str) -> Result<()>;

    async fn click(&self, address: &Address) -> Result<()>;

    async fn focus(&self, address: &Address) -> Result<()>;

    async fn blur(&self, address: &Address) -> Result<()>;

    /// Emit one character into the focused element as a real keystroke
    async fn type_char(&self, address: &Address, ch: char) -> Result<()>;

    /// Press a named key (`Enter`, `ArrowDown`, ...) on the element
    async fn press(&self, address: &Address, key: &str) -> Result<()>;

    /// Set the files of a file input
    async fn set_input_files(&self, address: &Address, files: &[PathBuf]) -> Result<()>;
}

/// Poll `probe` until it yields `Some`, bounded by `timeout`.
///
/// Returns the last probed value on success and `Ok(None)` on expiry; probe
/// errors end the wait immediately.
pub async fn poll_until<T, F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = probe().await? {
            trace!(attempts, elapsed_ms = started.elapsed().as_millis() as u64, "Condition met");
            return Ok(Some(value));
        }
        if tokio::time::Instant::now() >= deadline {
            trace!(attempts, "Condition not met before deadline");
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Map a raw wait expiry into another error, passing everything else through
pub fn map_wait_timeout(err: Error, f: impl FnOnce(u64) -> Error) -> Error {
    match err {
        Error::WaitTimeout { timeout_ms, .. } => f(timeout_ms),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_returns_first_hit() {
        let calls = AtomicUsize::new(0);
        let found = poll_until(Duration::from_secs(1), Duration::from_millis(10), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n >= 3 { Some(n) } else { None }) }
        })
        .await
        .unwrap();
        assert_eq!(found, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_expires() {
        let found: Option<()> = poll_until(Duration::from_millis(100), Duration::from_millis(10), || async {
            Ok(None)
        })
        .await
        .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_map_wait_timeout_only_maps_timeouts() {
        let mapped = map_wait_timeout(
            Error::WaitTimeout {
                address: "[id=\"x\"]".into(),
                state: WaitState::Attached,
                timeout_ms: 50,
            },
            |ms| Error::Driver(format!("gave up after {ms}")),
        );
        assert_eq!(mapped.to_string(), "Driver error: gave up after 50");

        let passed = map_wait_timeout(Error::Driver("boom".into()), |_| unreachable!());
        assert!(matches!(passed, Error::Driver(_)));
    }
}
