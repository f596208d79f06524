//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap downstream calls with a deadline
//! - Cancel the timed-out future cleanly (it is dropped, not detached)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - `None` means no deadline at this layer; another layer may still impose one

use std::future::Future;
use std::time::Duration;
use tokio::time;

use crate::resilience::error::ResilienceError;

/// Run `fut` under an optional deadline.
pub async fn enforce<F, T, E>(limit: Option<Duration>, fut: F) -> Result<T, ResilienceError<E>>
where
    F: Future<Output = Result<T, ResilienceError<E>>>,
{
    let Some(limit) = limit else {
        return fut.await;
    };
    match time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(timeout_ms = limit.as_millis() as u64, "Operation deadline exceeded");
            Err(ResilienceError::Timeout { after: limit })
        }
    }
}

/// The tighter of two optional deadlines.
pub fn tightest(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_enforce_times_out() {
        let result: Result<(), ResilienceError<()>> = enforce(Some(Duration::from_millis(50)), async {
            time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ResilienceError::Timeout { after }) if after == Duration::from_millis(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enforce_without_limit_waits() {
        let result: Result<u8, ResilienceError<()>> = enforce(None, async {
            time::sleep(Duration::from_secs(600)).await;
            Ok(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_tightest() {
        let s = Duration::from_secs;
        assert_eq!(tightest(Some(s(3)), Some(s(5))), Some(s(3)));
        assert_eq!(tightest(None, Some(s(5))), Some(s(5)));
        assert_eq!(tightest(None, None), None);
    }
}
