//! Recurring background tasks
//!
//! Replaces process-wide cron registration with a task owned by whoever
//! starts it:
//! - `DailySchedule`: a fixed "HH:MM" UTC time of day
//! - `Cadence`: daily, or a fixed period (ad-hoc tuning, tests)
//! - `RecurringTask`: spawned loop with explicit `start` / `stop`

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Work invoked by a [`RecurringTask`]
///
/// Jobs report their own failures; the task loop only sequences runs.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Execute one run
    async fn run(&self);
}

/// Once a day at a fixed UTC time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    run_at: NaiveTime,
}

impl DailySchedule {
    /// Parse an "HH:MM" time of day
    pub fn parse(run_at: &str) -> Result<Self> {
        let run_at = NaiveTime::parse_from_str(run_at, "%H:%M")
            .map_err(|e| Error::Config(format!("Invalid time format '{}': {}", run_at, e)))?;
        Ok(Self { run_at })
    }

    /// Configured time of day
    pub fn run_at(&self) -> NaiveTime {
        self.run_at
    }

    /// First run time strictly after `now`
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let today = now
            .date_naive()
            .and_time(self.run_at)
            .and_local_timezone(Utc)
            .single()
            .ok_or_else(|| Error::Config("Invalid timezone conversion".to_string()))?;

        if today > now {
            return Ok(today);
        }

        // Already past today's slot, run tomorrow
        Ok(today + Duration::days(1))
    }
}

/// When a recurring task fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Once a day at a fixed time
    Daily(DailySchedule),
    /// Every fixed period, first run one period after start
    Every(std::time::Duration),
}

impl Cadence {
    /// Wait before the next run, seen from `now`
    pub fn delay_from(&self, now: DateTime<Utc>) -> Result<std::time::Duration> {
        match self {
            Cadence::Daily(schedule) => {
                let next = schedule.next_run_after(now)?;
                (next - now)
                    .to_std()
                    .map_err(|e| Error::Config(format!("Negative delay to next run: {}", e)))
            }
            Cadence::Every(period) => Ok(*period),
        }
    }
}

/// Background loop running a job on a cadence until stopped
#[derive(Debug)]
pub struct RecurringTask {
    name: String,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RecurringTask {
    /// Spawn the loop on the current runtime
    pub fn start<J: ScheduledJob>(job: Arc<J>, cadence: Cadence) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let name = job.name().to_string();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!(task = %task_name, ?cadence, "Recurring task started");

            loop {
                let delay = match cadence.delay_from(Utc::now()) {
                    Ok(delay) => delay,
                    Err(e) => {
                        error!(task = %task_name, "Cannot compute next run: {}", e);
                        break;
                    }
                };
                debug!(task = %task_name, ?delay, "Next run scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        job.run().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(task = %task_name, "Recurring task stopped");
        });

        Self {
            name,
            shutdown,
            handle,
        }
    }

    /// Task name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the loop is still alive
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop and wait for it to exit
    ///
    /// A run already in progress completes first.
    pub async fn stop(self) -> Result<()> {
        // Receiver may already be gone if the loop exited on its own
        let _ = self.shutdown.send(true);
        self.handle.await?;
        Ok(())
    }
}
