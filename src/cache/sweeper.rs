//! Periodic expiry sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::cache::store::ResponseCache;

pub struct CacheSweeper {
    cache: Arc<ResponseCache>,
    interval: Duration,
}

impl CacheSweeper {
    pub fn new(cache: Arc<ResponseCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Sweep every interval until shutdown is signalled.
    ///
    /// The first sweep happens one interval after start, the startup sweep
    /// having already run.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Cache sweeper starting");

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.cache.sweep_expired().await {
                        Ok(report) => tracing::debug!(
                            scanned = report.scanned,
                            removed = report.removed,
                            remaining = report.remaining,
                            "Periodic cache sweep"
                        ),
                        Err(e) => tracing::warn!(error = %e, "Periodic cache sweep failed"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
