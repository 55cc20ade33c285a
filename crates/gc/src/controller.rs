//! Background loop driving the collector.
//!
//! Each cycle runs in its own task so that a panic inside a sweep surfaces
//! as a `JoinError` instead of tearing the loop down. A failed or panicked
//! cycle is logged and followed by a restart delay. The loop ends when its
//! [`CancellationToken`] is cancelled (aborting the cycle in flight) or
//! after the current cycle once [`GcHandle::shutdown`] raised the
//! force-stop flag.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::collector::GarbageCollector;

/// How long [`GcHandle::shutdown`] waits for the loop to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

impl GarbageCollector {
    /// Run the collection loop until `cancel` fires or a force stop is
    /// requested.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            max_concurrency = self.config.max_concurrency,
            "Garbage collector started"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Garbage collector cancelled");
                    break;
                }
                _ = interval.tick() => {}
            }

            let gc = Arc::clone(&self);
            let cycle = tokio::spawn(async move { gc.collect_garbage().await });
            let abort = cycle.abort_handle();

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    abort.abort();
                    tracing::info!("Garbage collector cancelled during a cycle");
                    break;
                }
                outcome = cycle => outcome,
            };

            let failed = match outcome {
                Ok(Ok(_)) => false,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Garbage collection cycle failed");
                    true
                }
                Err(e) if e.is_panic() => {
                    tracing::error!(error = %e, "Garbage collection cycle panicked");
                    true
                }
                Err(e) => {
                    tracing::error!(error = %e, "Garbage collection cycle was aborted");
                    true
                }
            };

            if self.force_stop.load(Ordering::SeqCst) {
                tracing::info!("Garbage collector force-stopped");
                break;
            }

            if failed {
                tracing::info!(
                    delay_secs = self.config.restart_delay.as_secs(),
                    "Restarting garbage collector after delay"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Garbage collector cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(self.config.restart_delay) => {}
                }
            }
        }
    }

    /// Start the loop on the runtime.
    pub fn spawn(self: Arc<Self>, parent: &CancellationToken) -> GcHandle {
        let cancel = parent.child_token();
        let task = tokio::spawn(Arc::clone(&self).run(cancel.clone()));
        GcHandle {
            gc: self,
            cancel,
            task,
        }
    }
}

/// Handle on a running collection loop.
pub struct GcHandle {
    gc: Arc<GarbageCollector>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl GcHandle {
    pub fn collector(&self) -> &Arc<GarbageCollector> {
        &self.gc
    }

    /// Raise the force-stop flag, cancel the loop and wait for it to exit.
    pub async fn shutdown(self) {
        self.gc.force_stop.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.task).await {
            Ok(Ok(())) => tracing::info!("Garbage collector stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "Garbage collector task failed"),
            Err(_) => tracing::warn!("Garbage collector did not stop in time"),
        }
    }
}
