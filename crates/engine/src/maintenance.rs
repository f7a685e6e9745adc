//! Background maintenance task.
//!
//! Two timers share one tokio task:
//!
//! - every `wal_flush_interval`: write out the WAL buffer, bounding how long
//!   an acknowledged write can sit in memory;
//! - every `interval`: flush a non-empty memtable that has seen no write for
//!   `idle_flush_after`, then compact while the table count exceeds the
//!   trigger.
//!
//! Both passes run on tokio's blocking pool. Errors are logged and the loop
//! keeps running.

use config::Config;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::{Db, Engine, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSettings {
    pub wal_flush_interval: Duration,
    pub interval: Duration,
    pub idle_flush_after: Duration,
}

impl From<&Config> for MaintenanceSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            wal_flush_interval: cfg.wal_flush_interval,
            interval: cfg.maintenance_interval,
            idle_flush_after: cfg.idle_flush_after,
        }
    }
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub flushed: bool,
    pub compactions: usize,
}

/// One idle-flush + compaction pass over the engine.
pub fn run_once(engine: &mut Engine, idle_flush_after: Duration) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::default();
    if engine.memtable_len() > 0 && engine.idle_for() >= idle_flush_after {
        report.flushed = engine.flush()?.is_some();
    }
    report.compactions = engine.compact_to_trigger()?;
    Ok(report)
}

/// Spawns the maintenance loop on the current tokio runtime.
///
/// The task runs until aborted through the returned handle.
pub fn spawn(db: Db, settings: MaintenanceSettings) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut wal_tick = interval(settings.wal_flush_interval);
        wal_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut maint_tick = interval(settings.interval);
        maint_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = wal_tick.tick() => {
                    if let Err(e) = db.flush_wal().await {
                        error!(error = %e, "background wal flush failed");
                    }
                }
                _ = maint_tick.tick() => {
                    let idle = settings.idle_flush_after;
                    match db.run_blocking(move |engine| run_once(engine, idle)).await {
                        Ok(report) if report != MaintenanceReport::default() => {
                            debug!(flushed = report.flushed, compactions = report.compactions, "maintenance pass");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "maintenance pass failed"),
                    }
                }
            }
        }
    })
}
