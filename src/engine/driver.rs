//! Accrual Driver
//!
//! Background task that ticks the lifecycle engine on a fixed interval until
//! the shutdown channel flips. A pass in progress finishes its current
//! contract and stops; the next run reconciles the rest from the cursors.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::lifecycle::ContractEngine;

pub struct AccrualDriver {
    engine: Arc<ContractEngine>,
    interval: Duration,
}

impl AccrualDriver {
    pub fn new(engine: Arc<ContractEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Run the driver loop until `shutdown` becomes true (or its sender drops)
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_interval_secs = self.interval.as_secs(),
            "Starting accrual driver"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if *shutdown.borrow() {
                break;
            }

            match self.engine.run_tick(Some(&shutdown)).await {
                Ok(report) if report.interrupted => break,
                Ok(_) => {}
                Err(e) => error!(error = %e, "Accrual tick failed"),
            }
        }

        info!("Accrual driver stopped");
    }

    /// Spawn the loop; the handle resolves once the driver has stopped
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
