//! Movement scheduler background task
//!
//! One long-lived tokio task that runs a synchronous step function at a
//! fixed interval. Each step runs on the blocking pool, since it holds the
//! engine lock and talks to the store. The stop signal is only observed
//! between steps, so a tick that has started always finishes. Store outages
//! back off and retry instead of ending the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Wait between ticks
    pub interval: Duration,
    /// Extra wait after the store was unreachable
    pub backoff: Duration,
}

impl SchedulerOptions {
    /// Back off for five tick intervals, never less than 100ms
    pub fn from_interval(interval: Duration) -> Self {
        Self {
            interval,
            backoff: (interval * 5).max(Duration::from_millis(100)),
        }
    }
}

/// Running scheduler; dropping it leaves the task running until cancelled
#[derive(Debug)]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal the loop without waiting for it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Signal the loop and wait for the in-flight tick to complete
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::error!("Movement scheduler task failed: {}", e);
        }
    }
}

/// Spawn the loop on the current tokio runtime
pub fn spawn<F>(options: SchedulerOptions, step: F) -> SchedulerHandle
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    let step = Arc::new(step);
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let join = tokio::spawn(async move {
        tracing::info!("Movement scheduler started ({:?} per tick)", options.interval);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(options.interval) => {}
            }

            let tick = Arc::clone(&step);
            let outcome = match tokio::task::spawn_blocking(move || tick()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Tick panicked: {}", e);
                    continue;
                }
            };

            match outcome {
                Ok(()) => {}
                Err(e) if e.is_store_unavailable() => {
                    tracing::warn!("{}; retrying in {:?}", e, options.backoff);
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(options.backoff) => {}
                    }
                }
                Err(e) => tracing::error!("Tick failed: {}", e),
            }
        }
        tracing::info!("Movement scheduler stopped");
    });

    SchedulerHandle { cancel, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::core::error::FleetError;

    #[tokio::test]
    async fn test_runs_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let handle = spawn(SchedulerOptions::from_interval(Duration::from_millis(1)), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        while count.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        handle.stop().await;

        let after_stop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_store_outage_does_not_end_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let options = SchedulerOptions {
            interval: Duration::from_millis(1),
            backoff: Duration::from_millis(1),
        };
        let handle = spawn(options, move || {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(FleetError::StoreUnavailable("down".into()))
            } else {
                Ok(())
            }
        });

        while count.load(Ordering::SeqCst) < 4 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(!handle.is_finished());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_step_runs_off_the_async_worker() {
        let blocking = Arc::new(AtomicUsize::new(0));
        let seen = blocking.clone();
        let handle = spawn(SchedulerOptions::from_interval(Duration::from_millis(1)), move || {
            // Entering a runtime is only allowed outside async worker context
            if tokio::runtime::Handle::try_current()
                .map(|h| h.block_on(async {}))
                .is_ok()
            {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        while blocking.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        handle.stop().await;
    }

    #[test]
    fn test_backoff_floor() {
        let options = SchedulerOptions::from_interval(Duration::from_millis(10));
        assert_eq!(options.backoff, Duration::from_millis(100));
        let options = SchedulerOptions::from_interval(Duration::from_millis(300));
        assert_eq!(options.backoff, Duration::from_millis(1500));
    }
}
