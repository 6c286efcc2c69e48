//! Bounded-concurrency spawning of session tasks.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

const DEFAULT_CONCURRENCY: NonZeroUsize = NonZeroUsize::new(4).unwrap();

/// Maximum number of sessions running a task at the same time.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    max_concurrency: NonZeroUsize,
}

impl SchedulerConfig {
    /// Creates a configuration with the supplied limit.
    #[must_use]
    pub const fn new(max_concurrency: NonZeroUsize) -> Self {
        Self { max_concurrency }
    }

    /// Creates a configuration from a plain count; `0` falls back to the
    /// default limit of 4.
    #[must_use]
    pub fn from_count(max_concurrency: usize) -> Self {
        NonZeroUsize::new(max_concurrency).map_or_else(Self::default, Self::new)
    }

    /// Returns the limit.
    #[must_use]
    pub const fn max_concurrency(self) -> NonZeroUsize {
        self.max_concurrency
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

/// Runs futures on the tokio runtime, at most `max_concurrency` at a time.
///
/// Futures beyond the limit are spawned immediately but wait for a permit
/// before they start. Clones share the same permits.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    permits: Arc<Semaphore>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrency().get())),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Number of futures currently holding a permit.
    #[must_use]
    pub fn running(&self) -> usize {
        self.config
            .max_concurrency()
            .get()
            .saturating_sub(self.permits.available_permits())
    }

    /// Returns `true` once [`TaskScheduler::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Stops accepting work. Futures still waiting for a permit resolve to
    /// [`SchedulerError::Closed`]; running ones finish normally.
    pub fn close(&self) {
        self.permits.close();
        debug!(running = self.running(), "scheduler closed");
    }

    /// Spawns `future`, which starts once a permit is free.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Closed`] when the scheduler is already
    /// closed. The handle itself yields [`SchedulerError::Closed`] if the
    /// scheduler closes before the future got a permit.
    pub fn spawn<F, T>(&self, future: F) -> SchedulerResult<JoinHandle<SchedulerResult<T>>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(SchedulerError::Closed);
        }

        let permits = Arc::clone(&self.permits);
        Ok(tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| SchedulerError::Closed)?;
            Ok::<_, SchedulerError>(future.await)
        }))
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// Errors produced by the scheduler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// The scheduler no longer accepts or starts work.
    #[error("scheduler closed")]
    Closed,
}

/// Result alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_the_limit() {
        let scheduler = TaskScheduler::new(SchedulerConfig::from_count(2));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                scheduler
                    .spawn(async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .unwrap()
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.running(), 0);
    }

    #[test]
    fn zero_count_uses_default() {
        assert_eq!(
            SchedulerConfig::from_count(0).max_concurrency(),
            DEFAULT_CONCURRENCY
        );
    }

    #[tokio::test]
    async fn closing_rejects_new_and_waiting_work() {
        let scheduler = TaskScheduler::new(SchedulerConfig::from_count(1));
        let (release, hold) = tokio::sync::oneshot::channel::<()>();
        let busy = scheduler
            .spawn(async move {
                let _ = hold.await;
            })
            .unwrap();
        while scheduler.running() == 0 {
            tokio::task::yield_now().await;
        }
        let waiting = scheduler.spawn(async {}).unwrap();

        scheduler.close();
        assert_eq!(scheduler.spawn(async {}).unwrap_err(), SchedulerError::Closed);
        assert_eq!(waiting.await.unwrap(), Err(SchedulerError::Closed));

        release.send(()).unwrap();
        assert_eq!(busy.await.unwrap(), Ok(()));
    }
}
