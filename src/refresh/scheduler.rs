//! Refresh scheduler - two independent timers feeding one refresh entry point
//!
//! The fixed-period tick keeps latency low while the forced-refresh heartbeat
//! guarantees a cycle at least once per bound, even if ticks are disabled or
//! starved. Both call [`RefreshCoordinator::run_cycle_with`].

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info};

use super::coordinator::RefreshCoordinator;
use super::monitor::CycleTrigger;
use crate::error::ConfigError;

/// Default forced-refresh bound
pub const DEFAULT_FORCED_REFRESH: Duration = Duration::from_millis(100);

/// Timer settings for the refresh task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshScheduler {
    /// Fixed tick period; `None` runs on heartbeats alone
    period: Option<Duration>,
    /// Upper bound between two cycles
    forced_refresh: Duration,
}

impl RefreshScheduler {
    pub fn new(
        period: Option<Duration>,
        forced_refresh: Duration,
    ) -> std::result::Result<Self, ConfigError> {
        if period == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidTiming(
                "refresh period must be non-zero".to_string(),
            ));
        }
        if forced_refresh.is_zero() {
            return Err(ConfigError::InvalidTiming(
                "forced refresh bound must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            period,
            forced_refresh,
        })
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn forced_refresh(&self) -> Duration {
        self.forced_refresh
    }

    /// Move the coordinator into a tokio task and start both timers
    pub fn spawn(self, coordinator: RefreshCoordinator) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(coordinator, shutdown_rx));
        SchedulerHandle {
            shutdown_tx: Some(shutdown_tx),
            join,
        }
    }

    async fn run(
        self,
        mut coordinator: RefreshCoordinator,
        mut shutdown: oneshot::Receiver<()>,
    ) -> RefreshCoordinator {
        let mut tick = self.period.map(make_interval);
        let mut heartbeat = make_interval(self.forced_refresh);

        info!(
            "Refresh scheduler started (period: {:?}, forced refresh: {:?}, {} devices)",
            self.period,
            self.forced_refresh,
            coordinator.device_count()
        );

        loop {
            tokio::select! {
                _ = next_tick(&mut tick) => {
                    coordinator.run_cycle_with(CycleTrigger::Tick);
                }
                _ = heartbeat.tick() => {
                    coordinator.run_cycle_with(CycleTrigger::Heartbeat);
                }
                _ = &mut shutdown => {
                    debug!("Refresh scheduler received shutdown");
                    break;
                }
            }
        }

        coordinator
    }
}

fn make_interval(period: Duration) -> Interval {
    let mut interval = time::interval(period);
    // A late refresh is superseded by the next one; never burst to catch up
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_tick(tick: &mut Option<Interval>) {
    match tick {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Handle to a running refresh task
pub struct SchedulerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<RefreshCoordinator>,
}

impl SchedulerHandle {
    /// Stop the timers and hand the coordinator back (for driver shutdown)
    pub async fn stop(mut self) -> Result<RefreshCoordinator> {
        if let Some(tx) = self.shutdown_tx.take() {
            // Receiver gone means the task already ended; join reports why
            let _ = tx.send(());
        }
        self.join
            .await
            .map_err(|e| anyhow!("Refresh task failed: {}", e))
    }
}
