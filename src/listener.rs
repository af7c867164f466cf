// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Stop-key listener for an active session.

use crate::keys::{KeystrokeSource, INTERRUPT_KEY};
use crate::session::{SessionTracker, StopTrigger};
use tracing::{debug, warn};

/// Reads keys until the stop key ends session `id`, or until the session ends some other way.
/// A listener blocked on its last read is reclaimed at process exit.
pub fn run(tracker: &SessionTracker, keys: &dyn KeystrokeSource, id: u64) {
    let stop_key = tracker.policy().stop_key;
    while tracker.is_current(id) {
        match keys.read_key() {
            Ok(key) if key.eq_ignore_ascii_case(&stop_key) => {
                tracker.finalize_session(id, StopTrigger::Manual);
                break;
            }
            Ok(INTERRUPT_KEY) => {
                tracker.finalize_session(id, StopTrigger::Signal);
                break;
            }
            Ok(key) => debug!(?key, "Ignoring key"),
            Err(e) => {
                warn!(error = %e, "Stop listener cannot read keys");
                break;
            }
        }
    }
    debug!(id, "Stop listener finished");
}
