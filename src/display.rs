// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Live elapsed-time line, redrawn in place while a session is active.

use crate::clock::format_elapsed;
use crate::session::{ActiveSession, SessionTracker};
use std::io::Write;
use std::sync::Mutex;
use std::thread;
use tracing::debug;

pub fn render_line(elapsed_secs: i64, stop_key: char) -> String {
    format!(
        "\rTime tracked: {}. Press '{}' to stop.",
        format_elapsed(elapsed_secs),
        stop_key
    )
}

/// Redraws until `session` is no longer the active one. Write errors are ignored.
pub fn run(tracker: &SessionTracker, session: ActiveSession, out: &Mutex<dyn Write + Send>) {
    let policy = *tracker.policy();
    while tracker.is_current(session.id) {
        let line = render_line(tracker.elapsed_secs(&session), policy.stop_key);
        if let Ok(mut out) = out.lock() {
            if let Err(e) = out.write_all(line.as_bytes()).and_then(|_| out.flush()) {
                debug!(error = %e, "Display write failed");
            }
        }
        thread::sleep(policy.display_interval);
    }
    debug!(id = session.id, "Display loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::tracker;
    use crate::session::StopTrigger;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_render_line() {
        assert_eq!(
            render_line(3725, 'd'),
            "\rTime tracked: 01:02:05. Press 'd' to stop."
        );
    }

    #[test]
    fn test_display_runs_while_active_and_stops_after() {
        let store = Arc::new(MemoryStore::default());
        let buf = Arc::new(Mutex::new(Vec::<u8>::new()));
        let out: Arc<Mutex<dyn Write + Send>> = buf.clone();
        let t = Arc::new(tracker(store, Duration::from_secs(3600)).with_display(out));
        t.start().unwrap();
        thread::sleep(Duration::from_millis(150));
        t.finalize(StopTrigger::Manual).unwrap();
        thread::sleep(Duration::from_millis(100));
        let frames = buf.lock().unwrap().len();
        assert!(frames > 0);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(buf.lock().unwrap().len(), frames, "display kept drawing after stop");
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(text.starts_with("\rTime tracked: 00:00:00. Press 'd' to stop."));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_display_errors_do_not_affect_session() {
        let store = Arc::new(MemoryStore::default());
        let out: Arc<Mutex<dyn Write + Send>> = Arc::new(Mutex::new(BrokenPipe));
        let t = Arc::new(tracker(store.clone(), Duration::from_secs(3600)).with_display(out));
        t.start().unwrap();
        thread::sleep(Duration::from_millis(60));
        assert!(t.finalize(StopTrigger::Manual).is_some());
        assert_eq!(store.records().len(), 1);
    }
}
