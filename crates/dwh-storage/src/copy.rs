//! Bounded polling of asynchronous server-side copies.
//!
//! # Design
//! - A copy is polled at a fixed interval until it reaches a terminal status or the
//!   wall-clock bound elapses; a stuck copy fails the file instead of blocking a worker.
//! - Probe errors are returned immediately; the caller decides whether they are fatal.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Status reported by the store for a copy task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyStatus {
    /// Still in progress.
    Pending,
    /// Completed successfully.
    Success,
    /// Failed or aborted; carries the reported status text.
    Failed(String),
}

impl CopyStatus {
    /// Interpret an `x-ms-copy-status` header value.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "success" => Self::Success,
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Terminal result of waiting on a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The copy completed.
    Success,
    /// The store reported a terminal failure.
    Failed(String),
    /// The copy was still pending when the bound elapsed.
    TimedOut(Duration),
}

impl CopyOutcome {
    /// Metric label for the outcome.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed(_) => "failed",
            Self::TimedOut(_) => "timed_out",
        }
    }

    /// Convert a non-success outcome into the matching error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CopyFailed`] or [`StorageError::CopyTimedOut`].
    pub fn into_result(self, operation: &'static str, name: &str) -> StorageResult<()> {
        match self {
            Self::Success => Ok(()),
            Self::Failed(reason) => Err(StorageError::CopyFailed {
                operation,
                name: name.to_string(),
                reason,
            }),
            Self::TimedOut(waited) => Err(StorageError::CopyTimedOut {
                operation,
                name: name.to_string(),
                waited,
            }),
        }
    }
}

/// Fixed-interval poller with a wall-clock deadline.
#[derive(Debug, Clone, Copy)]
pub struct CopyPoller {
    interval: Duration,
    timeout: Duration,
}

impl CopyPoller {
    /// Build a poller; a zero interval is raised to one millisecond.
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            timeout,
        }
    }

    /// Wait for a copy that started with status `initial`, calling `probe` for updates.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `probe`.
    pub async fn wait<F, Fut>(&self, initial: CopyStatus, mut probe: F) -> StorageResult<CopyOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<CopyStatus>>,
    {
        let started = Instant::now();
        let mut status = initial;
        let mut polls = 0_u32;
        loop {
            match status {
                CopyStatus::Success => return Ok(CopyOutcome::Success),
                CopyStatus::Failed(reason) => return Ok(CopyOutcome::Failed(reason)),
                CopyStatus::Pending => {}
            }
            let waited = started.elapsed();
            if waited >= self.timeout {
                return Ok(CopyOutcome::TimedOut(waited));
            }
            sleep(self.interval.min(self.timeout.saturating_sub(waited))).await;
            polls = polls.saturating_add(1);
            debug!(polls, "copy pending; polling status");
            status = probe().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn poller() -> CopyPoller {
        CopyPoller::new(Duration::from_millis(1), Duration::from_millis(200))
    }

    #[test]
    fn copy_status_parses_header_values() {
        assert_eq!(CopyStatus::parse("pending"), CopyStatus::Pending);
        assert_eq!(CopyStatus::parse("Success"), CopyStatus::Success);
        assert_eq!(
            CopyStatus::parse("aborted"),
            CopyStatus::Failed("aborted".to_string())
        );
    }

    #[tokio::test]
    async fn immediate_success_skips_probing() -> StorageResult<()> {
        let probes = AtomicU32::new(0);
        let outcome = poller()
            .wait(CopyStatus::Success, || {
                probes.fetch_add(1, Ordering::SeqCst);
                async { Ok(CopyStatus::Pending) }
            })
            .await?;
        assert_eq!(outcome, CopyOutcome::Success);
        assert_eq!(probes.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn pending_copy_is_polled_until_terminal() -> StorageResult<()> {
        let probes = AtomicU32::new(0);
        let outcome = poller()
            .wait(CopyStatus::Pending, || {
                let seen = probes.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(if seen < 2 {
                        CopyStatus::Pending
                    } else {
                        CopyStatus::Failed("failed".to_string())
                    })
                }
            })
            .await?;
        assert_eq!(outcome, CopyOutcome::Failed("failed".to_string()));
        assert_eq!(probes.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn stuck_copy_times_out() -> StorageResult<()> {
        let outcome = CopyPoller::new(Duration::from_millis(5), Duration::from_millis(20))
            .wait(CopyStatus::Pending, || async { Ok(CopyStatus::Pending) })
            .await?;
        assert!(matches!(outcome, CopyOutcome::TimedOut(waited) if waited >= Duration::from_millis(20)));
        assert!(matches!(
            outcome.into_result("move_to_outbox", "a.csv"),
            Err(StorageError::CopyTimedOut { .. })
        ));
        Ok(())
    }
}
