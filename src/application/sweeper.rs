use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// A store that can evict entries older than the timeout.
#[async_trait]
pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the number of evicted entries.
    async fn sweep(&self, now: Instant, timeout: Duration) -> usize;
}

/// Background task that sweeps one store on a fixed interval until stopped.
pub struct PeriodicSweep;

impl PeriodicSweep {
    pub fn spawn(target: Arc<dyn Sweep>, interval: Duration, timeout: Duration) -> SweepHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let name = target.name();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; nothing can be stale yet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = target.sweep(Instant::now(), timeout).await;
                        if evicted > 0 {
                            debug!(store = name, evicted, "Sweep evicted stale entries");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        info!(store = name, interval_secs = interval.as_secs(), "Started periodic sweep");
        SweepHandle {
            name,
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Owns a running sweep. Dropping the handle without `stop` also ends the task.
pub struct SweepHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signals the task and waits for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
        info!(store = self.name, "Stopped periodic sweep");
    }
}
