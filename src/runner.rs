//! Background backup loop
//!
//! The runner owns the single logical timer: it sleeps until the next
//! schedule tick, runs one backup cycle inline, then computes the next tick
//! strictly after completion. Because the cycle is awaited on the same
//! task, cycles are strictly serialized; a cycle that overruns one or more
//! ticks causes those triggers to be skipped and logged rather than queued.
//!
//! The runner never terminates on its own. Shutdown is requested through a
//! [`CancellationToken`], honored both while sleeping and between channel
//! fetches inside a cycle.

use crate::cycle::{BackupContext, run_cycle};
use crate::progress::ProgressState;
use crate::schedule::Schedule;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Periodically triggers backup cycles until cancelled
pub struct BackupRunner {
    ctx: BackupContext,
    state: ProgressState,
    schedule: Schedule,
    backup_at_start: bool,
    cancel: CancellationToken,
}

impl BackupRunner {
    /// Create a runner over a resolved context and the loaded watermark
    ///
    /// # Parameters
    /// - `ctx`: collaborators resolved at startup
    /// - `state`: watermark loaded from the progress store
    /// - `schedule`: recurring trigger cadence
    /// - `backup_at_start`: run one cycle immediately before the first tick
    /// - `cancel`: external shutdown signal
    pub fn new(
        ctx: BackupContext,
        state: ProgressState,
        schedule: Schedule,
        backup_at_start: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            state,
            schedule,
            backup_at_start,
            cancel,
        }
    }

    /// Run the backup loop until the cancellation token fires
    pub async fn run(mut self) {
        info!(schedule = %self.schedule, "Backup runner started");

        if self.backup_at_start {
            info!("Running startup backup cycle");
            self.trigger(Utc::now()).await;
        }

        let mut next_tick = self.schedule.next_after(Utc::now());
        loop {
            let wait = (next_tick - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            debug!(next_tick = %next_tick, wait_secs = wait.as_secs(), "Waiting for next trigger");

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Backup runner shutting down");
                    break;
                }
                _ = sleep(wait) => {}
            }

            self.trigger(Utc::now()).await;

            let (next, skipped) = advance_past(self.schedule, next_tick, Utc::now());
            if skipped > 0 {
                warn!(
                    skipped,
                    next_tick = %next,
                    "Skipped overdue triggers while previous cycle ran"
                );
            }
            next_tick = next;
        }

        info!("Backup runner stopped");
    }

    /// Run one cycle, absorbing its failure
    async fn trigger(&mut self, now: DateTime<Utc>) {
        match run_cycle(&self.ctx, &mut self.state, now, &self.cancel).await {
            Ok(outcome) if !outcome.completed => {
                debug!("Cycle ended early due to cancellation");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Backup cycle failed"),
        }
    }
}

/// First tick strictly after `now`, counting how many were skipped
///
/// `last_tick` is the tick that just fired. Each schedule boundary between
/// `last_tick` and `now` is a trigger that elapsed while the cycle ran and
/// is suppressed by the serialization policy.
fn advance_past(
    schedule: Schedule,
    last_tick: DateTime<Utc>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, u32) {
    let mut next = schedule.next_after(last_tick);
    let mut skipped = 0;
    while next <= now {
        skipped += 1;
        next = schedule.next_after(next);
    }
    (next, skipped)
}
