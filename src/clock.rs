// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Wall-clock source and duration arithmetic for sessions.

use crate::error::TrackerError;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

/// Source of local wall-clock time. Injected so scheduling math can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    /// Real time left until the local wall-clock time `at`; zero once it has passed.
    fn until(&self, at: NaiveDateTime) -> Duration {
        (at - self.now()).to_std().unwrap_or(Duration::ZERO)
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn until(&self, at: NaiveDateTime) -> Duration {
        until_local(&Local::now(), at)
    }
}

/// Real time from `now` until wall-clock `at` in the same zone, so a daylight-saving change in
/// between moves the wait by the offset shift. A wall-clock time the change skips over falls
/// back to the naive difference.
pub fn until_local<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveDateTime) -> Duration {
    let delta = match now.timezone().from_local_datetime(&at).earliest() {
        Some(target) => target.signed_duration_since(now.clone()),
        None => at - now.naive_local(),
    };
    delta.to_std().unwrap_or(Duration::ZERO)
}

/// Clock pinned to a settable instant.
#[cfg(test)]
pub struct FixedClock(std::sync::Mutex<NaiveDateTime>);

#[cfg(test)]
impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        FixedClock(std::sync::Mutex::new(at))
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.0.lock().unwrap() = at;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

/// Whole hours and minutes of a session; seconds are truncated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionDuration {
    pub hours: i64,
    pub minutes: i64,
}

impl SessionDuration {
    pub fn from_seconds(secs: i64) -> Self {
        let secs = secs.max(0);
        SessionDuration {
            hours: secs / 3600,
            minutes: (secs % 3600) / 60,
        }
    }

    /// Duration between two instants. An end before the start yields zero.
    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self::from_seconds((end - start).num_seconds())
    }

    pub fn total_minutes(&self) -> i64 {
        self.hours * 60 + self.minutes
    }

    pub fn from_minutes(minutes: i64) -> Self {
        Self::from_seconds(minutes * 60)
    }

    /// Parses the stored text form: `8h0m` (also accepts `8h 0m`).
    pub fn parse(s: &str) -> Result<Self, TrackerError> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(r"^\s*(\d+)h\s*(\d+)m\s*$").expect("static regex"));
        let caps = re
            .captures(s)
            .ok_or_else(|| TrackerError::InvalidDuration(s.to_string()))?;
        let hours: i64 = caps[1]
            .parse()
            .map_err(|_| TrackerError::InvalidDuration(s.to_string()))?;
        let minutes: i64 = caps[2]
            .parse()
            .map_err(|_| TrackerError::InvalidDuration(s.to_string()))?;
        Ok(Self::from_minutes(hours * 60 + minutes))
    }
}

impl fmt::Display for SessionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h{}m", self.hours, self.minutes)
    }
}

impl std::str::FromStr for SessionDuration {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Elapsed time for the live display, `HH:MM:SS`. Hours may exceed two digits.
pub fn format_elapsed(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
