// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Weekly CSV export: a background thread that sleeps until the next target weekday/time,
//! writes the current week's sessions to their own file, and goes back to sleep.

use crate::clock::{Clock, SessionDuration};
use crate::error::Result;
use crate::record::SessionRecord;
use crate::store::SessionStore;
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// Weekday and local time of day at which the export runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeeklySchedule {
    pub weekday: Weekday,
    pub at: NaiveTime,
}

impl WeeklySchedule {
    /// Next occurrence at or after `now`. On the target weekday after the target time, that is a week later.
    pub fn next_run(&self, now: NaiveDateTime) -> NaiveDateTime {
        let target = self.weekday.num_days_from_monday();
        let today = now.weekday().num_days_from_monday();
        let mut days_ahead = (7 + target - today) % 7;
        if days_ahead == 0 && now.time() > self.at {
            days_ahead = 7;
        }
        (now.date() + Days::new(u64::from(days_ahead))).and_time(self.at)
    }
}

/// Monday and Sunday of the ISO week containing `day`.
pub fn week_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = day - Days::new(u64::from(day.weekday().num_days_from_monday()));
    (monday, monday + Days::new(6))
}

/// Records dated within the Monday..=Sunday week of `day`, in stored order.
pub fn records_in_week(records: &[SessionRecord], day: NaiveDate) -> Vec<SessionRecord> {
    let (monday, sunday) = week_bounds(day);
    records
        .iter()
        .filter(|r| r.date >= monday && r.date <= sunday)
        .cloned()
        .collect()
}

pub fn total_duration(records: &[SessionRecord]) -> SessionDuration {
    SessionDuration::from_minutes(records.iter().map(|r| r.duration.total_minutes()).sum())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    Written {
        path: PathBuf,
        sessions: usize,
        total: SessionDuration,
    },
    /// Nothing recorded this week; no file is written.
    Empty,
}

/// Exports the week containing `today` to its own CSV file.
pub fn generate_weekly_export(store: &dyn SessionStore, today: NaiveDate) -> Result<ExportOutcome> {
    let weekly = records_in_week(&store.load_all(), today);
    if weekly.is_empty() {
        return Ok(ExportOutcome::Empty);
    }
    let (_, sunday) = week_bounds(today);
    let path = store.write_weekly_export(&weekly, sunday)?;
    Ok(ExportOutcome::Written {
        path,
        sessions: weekly.len(),
        total: total_duration(&weekly),
    })
}

/// Tells the user and the log how an export went. Errors are reported here, never propagated.
pub fn report_export(result: &Result<ExportOutcome>) {
    match result {
        Ok(ExportOutcome::Written {
            path,
            sessions,
            total,
        }) => {
            info!(path = %path.display(), sessions, %total, "Weekly CSV generated");
            println!(
                "\nWeekly CSV generated: {} ({} sessions, {})",
                path.display(),
                sessions,
                total
            );
        }
        Ok(ExportOutcome::Empty) => {
            info!("No time entries found for this week");
            println!("\nNo time entries found for this week.");
        }
        Err(e) => {
            error!(error = %e, "Weekly CSV generation failed");
            eprintln!("\nFailed to generate weekly CSV: {}", e);
        }
    }
}

/// Running scheduler thread. Dropping the handle ends the loop at its next wait; [`SchedulerHandle::stop`] also joins it.
pub struct SchedulerHandle {
    stop: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn stop(self) {
        drop(self.stop);
        let _ = self.thread.join();
    }
}

/// Spawns the weekly export loop. It keeps rescheduling after empty weeks and failed writes.
pub fn spawn(
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    schedule: WeeklySchedule,
) -> SchedulerHandle {
    let (stop, stopped) = mpsc::channel::<()>();
    let thread = thread::spawn(move || {
        // After a run, the next one is computed from strictly later than the run that just fired.
        let mut floor: Option<NaiveDateTime> = None;
        loop {
            let now = clock.now();
            let from = floor.map_or(now, |f| f.max(now));
            let next = schedule.next_run(from);
            info!(next = %next.format("%A %Y-%m-%d %H:%M:%S"), "Weekly CSV scheduled");
            println!("\nWeekly CSV scheduled to run at {}.", next.format("%A %H:%M:%S"));

            match stopped.recv_timeout(clock.until(next)) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }

            let result = generate_weekly_export(store.as_ref(), next.date());
            report_export(&result);
            floor = Some(next + TimeDelta::seconds(1));
        }
        info!("Weekly CSV scheduler stopped");
    });
    SchedulerHandle { stop, thread }
}
