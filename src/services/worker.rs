use crate::services::registry::TransferRegistry;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically evicts finished transfer records older than `max_age`.
pub struct RetentionWorker {
    registry: Arc<TransferRegistry>,
    max_age: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl RetentionWorker {
    pub fn new(
        registry: Arc<TransferRegistry>,
        max_age: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        // Sweep a few times per retention window, but not more than once a second
        let interval = (max_age / 4).max(Duration::from_secs(1));
        Self {
            registry,
            max_age,
            interval,
            shutdown,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Retention worker started (max age {:?}, every {:?})",
            self.max_age,
            self.interval
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Retention worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.sweep();
                }
            }
        }
    }

    fn sweep(&self) {
        if self.registry.is_empty() {
            return;
        }
        let removed = self.registry.cleanup(self.max_age);
        if removed > 0 {
            tracing::info!(
                "🧹 Evicted {} finished transfer records, {} remaining",
                removed,
                self.registry.len()
            );
        }
    }
}
