// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Session lifecycle: `Idle -> Active -> Stopping -> Idle`.
//!
//! Three independent terminators race to end a session: the stop-key listener, the
//! auto-stop timer and the termination handler. All of them go through [`SessionTracker::finalize`],
//! whose check-and-transition runs under one mutex, so exactly one of them produces the record.
//! The winner holds the session in `Stopping` until the record is written, and only then
//! releases the completion latch.

use crate::clock::{Clock, SessionDuration};
use crate::display;
use crate::keys::KeystrokeSource;
use crate::listener;
use crate::record::{SessionRecord, TIME_FORMAT};
use crate::store::SessionStore;
use chrono::NaiveDateTime;
use std::fmt;
use std::io::Write;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// What ended a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopTrigger {
    /// The stop key was pressed.
    Manual,
    /// The session reached its maximum duration.
    Auto,
    /// SIGINT/SIGTERM (or Ctrl-C typed in raw mode).
    Signal,
}

impl StopTrigger {
    /// Termination requests are reported to the user as automatic stops.
    fn describe(self) -> &'static str {
        match self {
            StopTrigger::Manual => "manually",
            StopTrigger::Auto | StopTrigger::Signal => "automatically",
        }
    }
}

impl fmt::Display for StopTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopTrigger::Manual => "manual",
            StopTrigger::Auto => "auto",
            StopTrigger::Signal => "signal",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveSession {
    /// Distinguishes sessions so a stale timer or listener cannot end a later one.
    pub id: u64,
    pub started_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active(ActiveSession),
    /// Finalize won and is writing the record.
    Stopping(ActiveSession),
}

/// Why the process is allowed to exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    Stopped(StopTrigger),
    /// The user answered no at the start prompt.
    Declined,
    /// Termination requested while no session was active.
    Interrupted,
}

/// One-shot latch the main thread blocks on. The first reason set wins.
#[derive(Default)]
pub struct Completion {
    reason: Mutex<Option<ExitReason>>,
    cv: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, reason: ExitReason) {
        let mut slot = lock(&self.reason);
        if slot.is_none() {
            *slot = Some(reason);
            self.cv.notify_all();
        }
    }

    pub fn get(&self) -> Option<ExitReason> {
        *lock(&self.reason)
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }

    pub fn wait(&self) -> ExitReason {
        let mut slot = lock(&self.reason);
        loop {
            if let Some(reason) = *slot {
                return reason;
            }
            slot = self.cv.wait(slot).unwrap_or_else(|p| p.into_inner());
        }
    }

    #[cfg(test)]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitReason> {
        let slot = lock(&self.reason);
        let (slot, _) = self
            .cv
            .wait_timeout_while(slot, timeout, |r| r.is_none())
            .unwrap_or_else(|p| p.into_inner());
        *slot
    }
}

/// Fixed policy for a session.
#[derive(Clone, Copy, Debug)]
pub struct SessionPolicy {
    pub max_duration: Duration,
    pub stop_key: char,
    pub display_interval: Duration,
}

/// Result of the one finalize call that won.
#[derive(Clone, Debug)]
pub struct Finalized {
    pub record: SessionRecord,
    pub trigger: StopTrigger,
    /// False when the record could not be written; the session is still over.
    pub persisted: bool,
}

struct Inner {
    phase: Phase,
    next_id: u64,
    /// Dropping the sender disarms the pending auto-stop timer.
    auto_stop: Option<mpsc::Sender<()>>,
}

pub struct SessionTracker {
    inner: Mutex<Inner>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
    completion: Arc<Completion>,
    keys: Option<Arc<dyn KeystrokeSource>>,
    display: Option<Arc<Mutex<dyn Write + Send>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionTracker {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        policy: SessionPolicy,
        completion: Arc<Completion>,
    ) -> Self {
        SessionTracker {
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                next_id: 1,
                auto_stop: None,
            }),
            store,
            clock,
            policy,
            completion,
            keys: None,
            display: None,
        }
    }

    /// Each started session gets a stop listener reading from `keys`.
    pub fn with_keystrokes(mut self, keys: Arc<dyn KeystrokeSource>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Each started session gets a live elapsed-time display written to `out`.
    pub fn with_display(mut self, out: Arc<Mutex<dyn Write + Send>>) -> Self {
        self.display = Some(out);
        self
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn completion(&self) -> &Arc<Completion> {
        &self.completion
    }

    pub fn snapshot(&self) -> Phase {
        lock(&self.inner).phase
    }

    /// True while `id` is the active session.
    pub fn is_current(&self, id: u64) -> bool {
        matches!(self.snapshot(), Phase::Active(s) if s.id == id)
    }

    /// Whole seconds since `session` started, by the tracker's clock.
    pub fn elapsed_secs(&self, session: &ActiveSession) -> i64 {
        (self.clock.now() - session.started_at).num_seconds()
    }

    /// Starts a session and its companions (auto-stop timer, display, stop listener).
    /// Returns `None` without side effects if a session is already active.
    pub fn start(self: &Arc<Self>) -> Option<ActiveSession> {
        let (session, disarm) = {
            let mut inner = lock(&self.inner);
            if let Phase::Active(current) | Phase::Stopping(current) = inner.phase {
                drop(inner);
                info!(id = current.id, "Start ignored: tracking already running");
                println!("Time tracking is already running.");
                return None;
            }
            let session = ActiveSession {
                id: inner.next_id,
                started_at: self.clock.now(),
            };
            inner.next_id += 1;
            inner.phase = Phase::Active(session);
            let (tx, rx) = mpsc::channel::<()>();
            inner.auto_stop = Some(tx);
            (session, rx)
        };

        println!(
            "Tracking started at {}.",
            session.started_at.format(TIME_FORMAT)
        );
        info!(id = session.id, max_duration = ?self.policy.max_duration, "Tracking started");

        self.spawn_auto_stop(session, disarm);
        if let Some(out) = &self.display {
            let tracker = Arc::clone(self);
            let out = Arc::clone(out);
            thread::spawn(move || display::run(&tracker, session, &out));
        }
        if let Some(keys) = &self.keys {
            let tracker = Arc::clone(self);
            let keys = Arc::clone(keys);
            thread::spawn(move || listener::run(&tracker, keys.as_ref(), session.id));
        }
        Some(session)
    }

    fn spawn_auto_stop(self: &Arc<Self>, session: ActiveSession, disarm: mpsc::Receiver<()>) {
        let tracker = Arc::clone(self);
        let max = self.policy.max_duration;
        thread::spawn(move || match disarm.recv_timeout(max) {
            Err(RecvTimeoutError::Timeout) => {
                tracker.finalize_session(session.id, StopTrigger::Auto);
            }
            _ => debug!(id = session.id, "Auto-stop disarmed"),
        });
    }

    /// Ends the active session, whichever it is. A no-op returning `None` when idle
    /// or when another finalize is already writing the record.
    pub fn finalize(&self, trigger: StopTrigger) -> Option<Finalized> {
        self.finish(None, trigger)
    }

    /// Ends the session only if `id` is still the active one.
    pub fn finalize_session(&self, id: u64, trigger: StopTrigger) -> Option<Finalized> {
        self.finish(Some(id), trigger)
    }

    /// Termination request: finalizes the active session, waits out a finalize already in
    /// progress (its winner releases the latch), and only releases the latch itself when idle.
    pub fn terminate(&self) -> Option<Finalized> {
        {
            let inner = lock(&self.inner);
            match inner.phase {
                Phase::Active(_) => {}
                Phase::Stopping(s) => {
                    info!(id = s.id, "Termination requested while the session is being saved");
                    return None;
                }
                Phase::Idle => {
                    self.completion.set(ExitReason::Interrupted);
                    return None;
                }
            }
        }
        // Losing the race to another terminator lands in one of the arms above on retry.
        match self.finish(None, StopTrigger::Signal) {
            Some(done) => Some(done),
            None => self.terminate(),
        }
    }

    fn finish(&self, expected: Option<u64>, trigger: StopTrigger) -> Option<Finalized> {
        let (session, ended_at, disarm) = {
            let mut inner = lock(&self.inner);
            let session = match inner.phase {
                Phase::Active(s) if expected.map_or(true, |id| id == s.id) => s,
                _ => {
                    drop(inner);
                    info!(%trigger, "Stop ignored: no matching active session");
                    return None;
                }
            };
            inner.phase = Phase::Stopping(session);
            (session, self.clock.now(), inner.auto_stop.take())
        };
        drop(disarm);

        let record = SessionRecord::from_instants(session.started_at, ended_at);
        let duration: SessionDuration = record.duration;
        println!(
            "\nTracking stopped {} at {}. Duration: {}h {}m.",
            trigger.describe(),
            ended_at.format(TIME_FORMAT),
            duration.hours,
            duration.minutes
        );
        info!(id = session.id, %trigger, %duration, "Tracking stopped");

        let persisted = match self.store.append_one(&record) {
            Ok(()) => {
                let csv_path = self.store.master_csv_path();
                println!("Data added to CSV: {}", csv_path.display());
                info!(path = %csv_path.display(), "Session saved");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to save session");
                eprintln!("\nFailed to save session: {}", e);
                false
            }
        };

        {
            let mut inner = lock(&self.inner);
            inner.phase = Phase::Idle;
            // Set under the state lock: whoever sees Idle after a stop also sees the latch set.
            self.completion.set(ExitReason::Stopped(trigger));
        }
        Some(Finalized {
            record,
            trigger,
            persisted,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::keys::{ScriptedKeys, INTERRUPT_KEY};
    use crate::store::MemoryStore;
    use std::sync::Barrier;

    pub(crate) fn policy(max_duration: Duration) -> SessionPolicy {
        SessionPolicy {
            max_duration,
            stop_key: 'd',
            display_interval: Duration::from_millis(20),
        }
    }

    pub(crate) fn tracker(store: Arc<MemoryStore>, max_duration: Duration) -> SessionTracker {
        SessionTracker::new(
            store,
            Arc::new(SystemClock),
            policy(max_duration),
            Arc::new(Completion::new()),
        )
    }

    const LONG: Duration = Duration::from_secs(3600);

    #[test]
    fn test_start_then_finalize_emits_one_record() {
        let store = Arc::new(MemoryStore::default());
        let t = Arc::new(tracker(store.clone(), LONG));
        let session = t.start().unwrap();
        assert_eq!(t.snapshot(), Phase::Active(session));

        let done = t.finalize(StopTrigger::Manual).unwrap();
        assert_eq!(done.trigger, StopTrigger::Manual);
        assert!(done.persisted);
        assert_eq!(t.snapshot(), Phase::Idle);
        assert_eq!(store.records(), vec![done.record]);
        assert_eq!(
            t.completion().get(),
            Some(ExitReason::Stopped(StopTrigger::Manual))
        );
    }

    #[test]
    fn test_finalize_when_idle_is_noop() {
        let store = Arc::new(MemoryStore::default());
        let t = tracker(store.clone(), LONG);
        assert!(t.finalize(StopTrigger::Auto).is_none());
        assert!(t.finalize(StopTrigger::Signal).is_none());
        assert_eq!(t.snapshot(), Phase::Idle);
        assert!(store.records().is_empty());
        assert!(!t.completion().is_set());
    }

    #[test]
    fn test_second_start_is_absorbed() {
        let store = Arc::new(MemoryStore::default());
        let t = Arc::new(tracker(store.clone(), LONG));
        let first = t.start().unwrap();
        assert!(t.start().is_none());
        assert_eq!(t.snapshot(), Phase::Active(first));
        t.finalize(StopTrigger::Manual).unwrap();
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_restart_after_finalize() {
        let store = Arc::new(MemoryStore::default());
        let t = Arc::new(tracker(store.clone(), LONG));
        let a = t.start().unwrap();
        t.finalize(StopTrigger::Manual).unwrap();
        let b = t.start().unwrap();
        assert_ne!(a.id, b.id);
        t.finalize(StopTrigger::Manual).unwrap();
        assert_eq!(store.records().len(), 2);
    }

    #[test]
    fn test_racing_terminators_produce_exactly_one_record() {
        let store = Arc::new(MemoryStore::default());
        let t = Arc::new(tracker(store.clone(), LONG));
        let triggers = [StopTrigger::Manual, StopTrigger::Auto, StopTrigger::Signal];
        for cycle in 0..20 {
            t.start().unwrap();
            let barrier = Arc::new(Barrier::new(9));
            let handles: Vec<_> = (0..9)
                .map(|i| {
                    let t = Arc::clone(&t);
                    let barrier = Arc::clone(&barrier);
                    let trigger = triggers[i % 3];
                    thread::spawn(move || {
                        barrier.wait();
                        t.finalize(trigger).is_some()
                    })
                })
                .collect();
            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1, "cycle {}", cycle);
            assert_eq!(store.records().len(), cycle + 1);
        }
    }

    #[test]
    fn test_stale_terminator_cannot_end_later_session() {
        let store = Arc::new(MemoryStore::default());
        let t = Arc::new(tracker(store.clone(), LONG));
        let old = t.start().unwrap();
        t.finalize(StopTrigger::Manual).unwrap();
        let current = t.start().unwrap();
        assert!(t.finalize_session(old.id, StopTrigger::Auto).is_none());
        assert_eq!(t.snapshot(), Phase::Active(current));
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_auto_stop_fires_after_max_duration() {
        let store = Arc::new(MemoryStore::default());
        let t = Arc::new(tracker(store.clone(), Duration::from_millis(100)));
        t.start().unwrap();
        let reason = t.completion().wait_timeout(Duration::from_secs(5));
        assert_eq!(reason, Some(ExitReason::Stopped(StopTrigger::Auto)));
        assert_eq!(t.snapshot(), Phase::Idle);
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_manual_stop_before_deadline_prevents_auto_record() {
        let store = Arc::new(MemoryStore::default());
        let t = Arc::new(tracker(store.clone(), Duration::from_millis(300)));
        t.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(t.finalize(StopTrigger::Manual).is_some());
        thread::sleep(Duration::from_millis(400));
        assert_eq!(store.records().len(), 1);
        assert_eq!(
            t.completion().get(),
            Some(ExitReason::Stopped(StopTrigger::Manual))
        );
    }

    #[test]
    fn test_failed_write_still_ends_session() {
        let store = Arc::new(MemoryStore::failing());
        let t = Arc::new(tracker(store.clone(), LONG));
        t.start().unwrap();
        let done = t.finalize(StopTrigger::Manual).unwrap();
        assert!(!done.persisted);
        assert_eq!(t.snapshot(), Phase::Idle);
        assert!(t.completion().is_set());
    }

    #[test]
    fn test_stop_key_via_listener() {
        let store = Arc::new(MemoryStore::default());
        let (tx, keys) = ScriptedKeys::new();
        let t = Arc::new(tracker(store.clone(), LONG).with_keystrokes(Arc::new(keys)));
        t.start().unwrap();
        tx.send('x').unwrap();
        tx.send('D').unwrap();
        let reason = t.completion().wait_timeout(Duration::from_secs(5));
        assert_eq!(reason, Some(ExitReason::Stopped(StopTrigger::Manual)));
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_interrupt_key_counts_as_signal() {
        let store = Arc::new(MemoryStore::default());
        let (tx, keys) = ScriptedKeys::new();
        let t = Arc::new(tracker(store.clone(), LONG).with_keystrokes(Arc::new(keys)));
        t.start().unwrap();
        tx.send(INTERRUPT_KEY).unwrap();
        let reason = t.completion().wait_timeout(Duration::from_secs(5));
        assert_eq!(reason, Some(ExitReason::Stopped(StopTrigger::Signal)));
    }

    #[test]
    fn test_session_across_midnight_keeps_start_date() {
        use crate::clock::FixedClock;
        use chrono::NaiveDate;
        let store = Arc::new(MemoryStore::default());
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let clock = Arc::new(FixedClock::new(day.and_hms_opt(23, 30, 0).unwrap()));
        let t = Arc::new(SessionTracker::new(
            store.clone(),
            clock.clone(),
            policy(LONG),
            Arc::new(Completion::new()),
        ));
        let session = t.start().unwrap();
        clock.set(day.succ_opt().unwrap().and_hms_opt(0, 45, 30).unwrap());
        assert_eq!(t.elapsed_secs(&session), 75 * 60 + 30);

        let done = t.finalize(StopTrigger::Manual).unwrap();
        assert_eq!(done.record.date, day);
        assert_eq!(done.record.duration, SessionDuration { hours: 1, minutes: 15 });
    }

    #[test]
    fn test_completion_first_reason_wins() {
        let c = Completion::new();
        assert_eq!(c.wait_timeout(Duration::from_millis(10)), None);
        c.set(ExitReason::Declined);
        c.set(ExitReason::Interrupted);
        assert_eq!(c.wait(), ExitReason::Declined);
    }
}
