//! Shared jittered-interval periodic-worker abstraction.
//!
//! Every long-running control loop in the collection engine (the
//! Active-Set Cache refresher, the Finalizer, the Cleaner) is built on top
//! of this one executor rather than rolling its own timer, so interval
//! jitter, error logging, and the join-on-stop contract only need to be
//! gotten right once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// One tick of a periodic worker.
#[async_trait]
pub trait Tick: Send + Sync + 'static {
    async fn tick(&self) -> anyhow::Result<()>;

    /// Human-readable name used in log lines.
    fn name(&self) -> &str;
}

/// Runs a [`Tick`] on a `interval ± jitter` cadence until stopped.
///
/// Errors returned by a tick are logged but never stop the loop — the
/// next tick is always attempted. Cancellation-style errors (signalled by
/// the caller calling [`PeriodicExecutor::stop`]) do not reach `tick` at
/// all, since the loop selects between the shutdown signal and the sleep.
pub struct PeriodicExecutor {
    interval: Duration,
    jitter: Duration,
    shutdown: Arc<Notify>,
}

impl PeriodicExecutor {
    pub fn new(interval: Duration, jitter: Duration) -> Self {
        Self {
            interval,
            jitter,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle that [`Self::stop`] uses; keep a clone if you need to signal
    /// shutdown from outside the spawned task.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.interval;
        }
        let extra_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        self.interval + Duration::from_millis(extra_ms)
    }

    /// Spawn the loop on the current runtime. Returns a handle joinable
    /// from [`Self::stop`].
    pub fn spawn<W: Tick>(self: Arc<Self>, worker: Arc<W>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(worker = worker.name(), "periodic worker started");
            loop {
                tokio::select! {
                    _ = self.shutdown.notified() => {
                        info!(worker = worker.name(), "periodic worker stopping");
                        break;
                    }
                    _ = tokio::time::sleep(self.next_delay()) => {
                        if let Err(e) = worker.tick().await {
                            error!(worker = worker.name(), error = %e, "periodic tick failed");
                        }
                    }
                }
            }
        })
    }

    /// Signal shutdown and wait for the spawned task to exit.
    pub async fn stop(&self, handle: JoinHandle<()>) {
        self.shutdown.notify_one();
        let _ = handle.await;
    }
}

/// Convenience for tests and one-off tasks: run `body` on the jittered
/// cadence without defining a [`Tick`] impl.
pub async fn run_until_shutdown<F, Fut>(
    interval: Duration,
    jitter: Duration,
    shutdown: Arc<Notify>,
    mut body: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let exec = PeriodicExecutor::new(interval, jitter);
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = tokio::time::sleep(exec.next_delay()) => {
                if let Err(e) = body().await {
                    error!(error = %e, "periodic tick failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWorker {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tick for CountingWorker {
        async fn tick(&self) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn ticks_at_least_once_before_stop() {
        let count = Arc::new(AtomicUsize::new(0));
        let worker = Arc::new(CountingWorker { count: count.clone() });
        let exec = Arc::new(PeriodicExecutor::new(Duration::from_millis(5), Duration::ZERO));
        let handle = exec.clone().spawn(worker);

        tokio::time::sleep(Duration::from_millis(30)).await;
        exec.stop(handle).await;

        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn jittered_delay_is_within_bounds() {
        let exec = PeriodicExecutor::new(Duration::from_secs(10), Duration::from_secs(2));
        for _ in 0..50 {
            let d = exec.next_delay();
            assert!(d >= Duration::from_secs(10));
            assert!(d <= Duration::from_secs(12));
        }
    }
}
