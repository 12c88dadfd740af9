//! Liveness sweeper
//!
//! Periodic cleanup bounding memory growth from connections whose close event
//! never arrived. Each pass prunes pairings that reference departed endpoints
//! and evicts endpoints idle past the inactivity threshold. The coordinator is
//! correct without it.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::{SweeperConfig, MAX_INACTIVITY_TIMEOUT_SECS};
use crate::coordinator::{SessionCoordinator, SweepReport};

pub struct LivenessSweeper {
    coordinator: Arc<SessionCoordinator>,
    interval: Duration,
    inactivity_timeout: chrono::Duration,
}

impl LivenessSweeper {
    pub fn new(coordinator: Arc<SessionCoordinator>, config: &SweeperConfig) -> Self {
        Self {
            coordinator,
            // tokio intervals reject a zero period
            interval: Duration::from_secs(config.interval_secs.max(1)),
            inactivity_timeout: chrono::Duration::seconds(
                config.inactivity_timeout_secs.min(MAX_INACTIVITY_TIMEOUT_SECS) as i64,
            ),
        }
    }

    /// Run one sweep against the current time
    pub fn run_once(&self) -> SweepReport {
        let report = self.coordinator.sweep(Utc::now(), self.inactivity_timeout);
        if report.pruned_pairs > 0 || !report.evicted.is_empty() {
            tracing::info!(
                pruned_pairs = report.pruned_pairs,
                evicted = report.evicted.len(),
                "Liveness sweep removed stale state"
            );
        } else {
            tracing::debug!("Liveness sweep found nothing to remove");
        }
        report
    }

    /// Sweep on a fixed period until shutdown is signalled
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        tracing::info!(
            "Liveness sweeper started (interval: {}s, inactivity timeout: {}s)",
            self.interval.as_secs(),
            self.inactivity_timeout.num_seconds()
        );

        let mut ticker = tokio::time::interval(self.interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once();
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Liveness sweeper shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sweeper(coordinator: &Arc<SessionCoordinator>, timeout_secs: u64) -> LivenessSweeper {
        LivenessSweeper::new(
            Arc::clone(coordinator),
            &SweeperConfig {
                interval_secs: 60,
                inactivity_timeout_secs: timeout_secs,
            },
        )
    }

    #[test]
    fn test_run_once_keeps_active_endpoints() {
        let coordinator = Arc::new(SessionCoordinator::default());
        let conn = coordinator.connect();
        coordinator
            .register_role(conn.guard.id(), "phone", Value::Null)
            .unwrap();

        let report = sweeper(&coordinator, 1800).run_once();

        assert_eq!(report, SweepReport::default());
        assert_eq!(coordinator.status().total_endpoints, 1);
    }

    #[test]
    fn test_run_once_evicts_idle_endpoint() {
        let coordinator = Arc::new(SessionCoordinator::default());
        let conn = coordinator.connect();
        let id = conn.guard.id().to_string();
        coordinator.touch_at(&id, Utc::now() - chrono::Duration::minutes(31));

        let report = sweeper(&coordinator, 1800).run_once();

        assert_eq!(report.evicted, vec![id]);
        assert_eq!(coordinator.status().total_endpoints, 0);
    }

    #[test]
    fn test_oversized_timeout_evicts_nothing() {
        let coordinator = Arc::new(SessionCoordinator::default());
        let conn = coordinator.connect();
        coordinator.touch_at(conn.guard.id(), Utc::now() - chrono::Duration::days(365));

        let report = sweeper(&coordinator, u64::MAX).run_once();

        assert!(report.evicted.is_empty());
        assert_eq!(coordinator.status().total_endpoints, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_does_not_kill_the_loop() {
        let coordinator = Arc::new(SessionCoordinator::default());
        let sweeper = LivenessSweeper::new(
            Arc::clone(&coordinator),
            &SweeperConfig {
                interval_secs: 0,
                inactivity_timeout_secs: 1800,
            },
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(sweeper.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown_tx.send(()).unwrap();
        assert!(handle.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweeps_periodically_and_stops_on_shutdown() {
        let coordinator = Arc::new(SessionCoordinator::default());
        let conn = coordinator.connect();
        let id = conn.guard.id().to_string();
        coordinator.touch_at(&id, Utc::now() - chrono::Duration::hours(1));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(sweeper(&coordinator, 1800).run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(coordinator.status().total_endpoints, 0);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
