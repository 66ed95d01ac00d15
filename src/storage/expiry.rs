//! Background eviction of idle entries.
//!
//! A single long-lived task wakes up every `interval`, takes the current
//! time, and asks the repository to evict every entry whose idle deadline
//! has passed. Eviction detaches the slab from the map; readers that still
//! hold it keep streaming.

use super::repository::Repository;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweeps.
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Handle to the running sweeper task.
///
/// Dropping the handle stops the sweeper.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Start the sweeper as a background task.
    pub fn start(repository: Arc<Repository>, config: SweepConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(repository, config, shutdown_rx));
        info!("expiration sweeper started");

        Self { shutdown_tx }
    }

    /// Stop the sweeper. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    repository: Arc<Repository>,
    config: SweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("expiration sweeper stopped");
                    return;
                }
                continue;
            }
        }

        let evicted = repository.sweep_expired(Instant::now());
        if evicted > 0 {
            debug!(evicted, remaining = repository.len(), "swept idle entries");
        }
    }
}

/// Start a sweeper with the default interval.
pub fn start_sweeper(repository: Arc<Repository>) -> ExpirySweeper {
    ExpirySweeper::start(repository, SweepConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::policy::ExpirationPolicy;

    #[tokio::test]
    async fn test_sweeper_evicts_idle_entry() {
        let policy = ExpirationPolicy::new(Duration::from_millis(100), Vec::new());
        let repo = Arc::new(Repository::new(policy));
        repo.create("/short-lived", "text/plain");

        let sweeper = ExpirySweeper::start(
            repo.clone(),
            SweepConfig {
                interval: Duration::from_millis(20),
            },
        );

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(repo.lookup("/short-lived").is_none());
        assert_eq!(repo.metrics().expired, 1);
        sweeper.stop();
    }

    #[tokio::test]
    async fn test_stopped_sweeper_leaves_entries_alone() {
        let policy = ExpirationPolicy::new(Duration::from_millis(50), Vec::new());
        let repo = Arc::new(Repository::new(policy));

        let sweeper = ExpirySweeper::start(
            repo.clone(),
            SweepConfig {
                interval: Duration::from_millis(20),
            },
        );
        sweeper.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;

        repo.create("/survivor", "text/plain");
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Expired by the policy, but nobody is sweeping anymore.
        assert_eq!(repo.len(), 1);
    }
}
