// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! SIGINT/SIGTERM handling. The handler never exits the process itself; it ends the
//! active session (or releases the main thread) and lets `main` return normally.

use crate::error::Result;
use crate::session::SessionTracker;
use std::sync::Arc;
use tracing::info;

pub fn install(tracker: Arc<SessionTracker>) -> Result<()> {
    ctrlc::set_handler(move || handle_termination(&tracker))?;
    Ok(())
}

/// Finalizes the active session if there is one, otherwise just releases the main thread.
/// A session already being saved by another stop releases the main thread once its record is written.
pub fn handle_termination(tracker: &SessionTracker) {
    info!("Termination requested");
    if let Some(done) = tracker.terminate() {
        info!(
            trigger = %done.trigger,
            date = %done.record.date,
            duration = %done.record.duration,
            persisted = done.persisted,
            "Session ended by termination request"
        );
    }
    println!("\nTime tracker terminated.");
    info!("Time tracker terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::record::SessionRecord;
    use crate::session::tests::{policy, tracker};
    use crate::session::{Completion, ExitReason, Phase, StopTrigger};
    use crate::store::{MemoryStore, SessionStore};
    use chrono::NaiveDate;
    use std::path::{Path, PathBuf};
    use std::thread;
    use std::time::Duration;

    /// Store whose appends take a while, leaving a window in which a signal can land.
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl SessionStore for SlowStore {
        fn load_all(&self) -> Vec<SessionRecord> {
            self.inner.load_all()
        }

        fn append_one(&self, record: &SessionRecord) -> crate::error::Result<()> {
            thread::sleep(self.delay);
            self.inner.append_one(record)
        }

        fn write_weekly_export(
            &self,
            records: &[SessionRecord],
            week_ending: NaiveDate,
        ) -> crate::error::Result<PathBuf> {
            self.inner.write_weekly_export(records, week_ending)
        }

        fn master_csv_path(&self) -> &Path {
            self.inner.master_csv_path()
        }
    }

    #[test]
    fn test_termination_while_idle_releases_main() {
        let store = Arc::new(MemoryStore::default());
        let t = tracker(store.clone(), Duration::from_secs(3600));
        handle_termination(&t);
        assert_eq!(t.completion().get(), Some(ExitReason::Interrupted));
        assert!(store.records().is_empty());
    }

    #[test]
    fn test_termination_while_active_finalizes() {
        let store = Arc::new(MemoryStore::default());
        let t = Arc::new(tracker(store.clone(), Duration::from_secs(3600)));
        t.start().unwrap();
        handle_termination(&t);
        assert_eq!(t.snapshot(), Phase::Idle);
        assert_eq!(
            t.completion().get(),
            Some(ExitReason::Stopped(StopTrigger::Signal))
        );
        assert_eq!(store.records().len(), 1);
        // A second request finds nothing to stop.
        handle_termination(&t);
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_termination_during_save_waits_for_the_write() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::default(),
            delay: Duration::from_millis(300),
        });
        let t = Arc::new(SessionTracker::new(
            store.clone(),
            Arc::new(SystemClock),
            policy(Duration::from_secs(3600)),
            Arc::new(Completion::new()),
        ));
        let session = t.start().unwrap();
        let stopper = {
            let t = Arc::clone(&t);
            thread::spawn(move || t.finalize(StopTrigger::Manual))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(t.snapshot(), Phase::Stopping(session));

        handle_termination(&t);
        let reason = t.completion().wait();
        assert_eq!(store.inner.records().len(), 1, "main released before the record was written");
        assert_eq!(reason, ExitReason::Stopped(StopTrigger::Manual));
        assert!(stopper.join().unwrap().unwrap().persisted);
        assert_eq!(t.snapshot(), Phase::Idle);
    }

    #[test]
    fn test_start_refused_while_previous_session_is_saving() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::default(),
            delay: Duration::from_millis(200),
        });
        let t = Arc::new(SessionTracker::new(
            store.clone(),
            Arc::new(SystemClock),
            policy(Duration::from_secs(3600)),
            Arc::new(Completion::new()),
        ));
        t.start().unwrap();
        let stopper = {
            let t = Arc::clone(&t);
            thread::spawn(move || t.finalize(StopTrigger::Auto))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(t.start().is_none());
        stopper.join().unwrap().unwrap();
        assert_eq!(store.inner.records().len(), 1);
    }
}
