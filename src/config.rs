// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Paths and fixed policy values.
//!
//! All data lives under a single root: `$TT_HOME` if set, otherwise `$HOME/scripts`.

use crate::error::{Result, TrackerError};
use crate::scheduler::WeeklySchedule;
use chrono::{NaiveTime, Weekday};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default path segment under `$HOME` for all tracker data.
const DEFAULT_ROOT: &str = "scripts";

const ENTRIES_FILE: &str = "time_entries.json";
const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "time_tracker.log";
const EXPORT_DIR: &str = "export";
const MASTER_CSV_FILE: &str = "time_tracker_log.csv";

/// Sessions are stopped automatically after 7h40m.
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 3600 + 40 * 60);

/// Key that ends an active session (matched case-insensitively).
pub const STOP_KEY: char = 'd';

/// How often the live display redraws the elapsed time.
pub const DISPLAY_INTERVAL: Duration = Duration::from_secs(1);

const WEEKLY_EXPORT_DAY: Weekday = Weekday::Fri;
const WEEKLY_EXPORT_HOUR: u32 = 16;

#[derive(Clone, Debug)]
pub struct Config {
    pub entries_path: PathBuf,
    pub log_path: PathBuf,
    pub export_dir: PathBuf,
    pub master_csv_path: PathBuf,
    pub max_duration: Duration,
    pub stop_key: char,
    pub weekly: WeeklySchedule,
    pub debug: bool,
}

impl Config {
    /// Builds the configuration from `TT_HOME` / `HOME` and `TT_DEBUG`.
    pub fn from_env() -> Result<Self> {
        let root = match env::var_os("TT_HOME") {
            Some(root) if !root.is_empty() => PathBuf::from(root),
            _ => env::var_os("HOME")
                .map(|h| PathBuf::from(h).join(DEFAULT_ROOT))
                .ok_or(TrackerError::HomeNotFound)?,
        };
        let mut config = Config::with_root(&root);
        config.debug = env::var_os("TT_DEBUG").is_some();
        Ok(config)
    }

    pub fn with_root(root: &Path) -> Self {
        let export_dir = root.join(EXPORT_DIR);
        Config {
            entries_path: root.join(ENTRIES_FILE),
            log_path: root.join(LOG_DIR).join(LOG_FILE),
            master_csv_path: export_dir.join(MASTER_CSV_FILE),
            export_dir,
            max_duration: MAX_DURATION,
            stop_key: STOP_KEY,
            weekly: WeeklySchedule {
                weekday: WEEKLY_EXPORT_DAY,
                at: NaiveTime::from_hms_opt(WEEKLY_EXPORT_HOUR, 0, 0).unwrap_or(NaiveTime::MIN),
            },
            debug: false,
        }
    }

    /// Creates the export and log directories. Failure here is fatal for the caller.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.export_dir).map_err(|e| TrackerError::io(&self.export_dir, e))?;
        if let Some(dir) = self.log_path.parent() {
            fs::create_dir_all(dir).map_err(|e| TrackerError::io(dir, e))?;
        }
        if let Some(dir) = self.entries_path.parent() {
            fs::create_dir_all(dir).map_err(|e| TrackerError::io(dir, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_layout() {
        let c = Config::with_root(Path::new("/data"));
        assert_eq!(c.entries_path, PathBuf::from("/data/time_entries.json"));
        assert_eq!(c.log_path, PathBuf::from("/data/logs/time_tracker.log"));
        assert_eq!(c.master_csv_path, PathBuf::from("/data/export/time_tracker_log.csv"));
        assert_eq!(c.weekly.weekday, Weekday::Fri);
        assert_eq!(c.weekly.at, NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        assert_eq!(c.max_duration, Duration::from_secs(27_600));
    }

    #[test]
    fn test_ensure_dirs_creates_tree() {
        let dir = tempfile::tempdir().unwrap();
        let c = Config::with_root(&dir.path().join("nested"));
        c.ensure_dirs().unwrap();
        assert!(c.export_dir.is_dir());
        assert!(c.log_path.parent().unwrap().is_dir());
    }
}
