// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Durable session log: a JSON array of records plus a cumulative CSV mirror,
//! and standalone weekly CSV exports.

use crate::error::{Result, TrackerError};
use crate::record::{SessionRecord, CSV_HEADERS};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Persistence port used by the session tracker and the weekly scheduler.
pub trait SessionStore: Send + Sync {
    /// All stored records in insertion order. Missing or corrupt storage reads as empty.
    fn load_all(&self) -> Vec<SessionRecord>;

    /// Appends one record to the store and one row to the cumulative export.
    fn append_one(&self, record: &SessionRecord) -> Result<()>;

    /// Writes a standalone weekly export named by the week's last day; returns its path.
    fn write_weekly_export(&self, records: &[SessionRecord], week_ending: NaiveDate) -> Result<PathBuf>;

    /// Where the cumulative export lives, for user messages.
    fn master_csv_path(&self) -> &Path;
}

/// File-backed store. Every operation holds one lock so concurrent writers never interleave.
pub struct FileStore {
    entries_path: PathBuf,
    master_csv_path: PathBuf,
    export_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(entries_path: PathBuf, master_csv_path: PathBuf, export_dir: PathBuf) -> Self {
        FileStore {
            entries_path,
            master_csv_path,
            export_dir,
            lock: Mutex::new(()),
        }
    }

    pub fn weekly_export_path(&self, week_ending: NaiveDate) -> PathBuf {
        self.export_dir.join(format!(
            "time_tracker_weekly_{}.csv",
            week_ending.format("%Y-%m-%d")
        ))
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        // A panic while holding the lock leaves no partial state behind in memory.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Where an unusable store is copied before it is replaced.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.entries_path.as_os_str().to_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Stored entries; `None` when the file exists but cannot be read or does not hold
    /// a list of records (bad syntax or a record with the wrong shape).
    fn read_entries(&self) -> Option<Vec<SessionRecord>> {
        let content = match fs::read_to_string(&self.entries_path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Some(Vec::new()),
            Err(e) => {
                warn!(error = %e, path = %self.entries_path.display(), "Failed to read time entries");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!(error = %e, path = %self.entries_path.display(), "Time entries are corrupt; treating as empty");
                None
            }
        }
    }

    /// Copies the unusable store aside so starting fresh never destroys it.
    fn back_up_rejected(&self) -> Result<()> {
        let backup = self.backup_path();
        fs::copy(&self.entries_path, &backup).map_err(|e| TrackerError::io(&backup, e))?;
        warn!(backup = %backup.display(), "Unusable time entries backed up before rewrite");
        Ok(())
    }

    fn save_entries(&self, entries: &[SessionRecord]) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        entries.serialize(&mut ser).map_err(|source| TrackerError::Json {
            path: self.entries_path.clone(),
            source,
        })?;
        fs::write(&self.entries_path, buf).map_err(|e| TrackerError::io(&self.entries_path, e))
    }

    fn append_master_row(&self, record: &SessionRecord) -> Result<()> {
        let path = &self.master_csv_path;
        let csv_err = |source: csv::Error| TrackerError::Csv {
            path: path.clone(),
            source,
        };
        let is_new = !path.exists();
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| TrackerError::io(path, e))?;
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            wtr.write_record(CSV_HEADERS).map_err(csv_err)?;
        }
        wtr.write_record(record.csv_row()).map_err(csv_err)?;
        wtr.flush().map_err(|e| TrackerError::io(path, e))?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn load_all(&self) -> Vec<SessionRecord> {
        let _guard = self.guard();
        self.read_entries().unwrap_or_default()
    }

    fn append_one(&self, record: &SessionRecord) -> Result<()> {
        let _guard = self.guard();
        let mut entries = match self.read_entries() {
            Some(entries) => entries,
            None => {
                self.back_up_rejected()?;
                Vec::new()
            }
        };
        entries.push(record.clone());
        self.save_entries(&entries)?;
        debug!(count = entries.len(), "Time entries saved");
        self.append_master_row(record)
    }

    fn write_weekly_export(&self, records: &[SessionRecord], week_ending: NaiveDate) -> Result<PathBuf> {
        let _guard = self.guard();
        let path = self.weekly_export_path(week_ending);
        let csv_err = |source: csv::Error| TrackerError::Csv {
            path: path.clone(),
            source,
        };
        let mut wtr = csv::Writer::from_path(&path).map_err(csv_err)?;
        wtr.write_record(CSV_HEADERS).map_err(csv_err)?;
        for record in records {
            wtr.write_record(record.csv_row()).map_err(csv_err)?;
        }
        wtr.flush().map_err(|e| TrackerError::io(&path, e))?;
        Ok(path)
    }

    fn master_csv_path(&self) -> &Path {
        &self.master_csv_path
    }
}

/// In-memory store for exercising the tracker and scheduler without touching disk.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<SessionRecord>>,
    exports: Mutex<Vec<(NaiveDate, Vec<SessionRecord>)>>,
    fail_writes: bool,
    master_csv: PathBuf,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_records(records: Vec<SessionRecord>) -> Self {
        MemoryStore {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    /// Every write fails with an I/O error; reads still succeed.
    pub fn failing() -> Self {
        MemoryStore {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn failing_with(records: Vec<SessionRecord>) -> Self {
        MemoryStore {
            records: Mutex::new(records),
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn exports(&self) -> Vec<(NaiveDate, Vec<SessionRecord>)> {
        self.exports.lock().unwrap().clone()
    }

    fn write_error(&self) -> TrackerError {
        TrackerError::io(&self.master_csv, io::Error::new(io::ErrorKind::Other, "disk full"))
    }
}

#[cfg(test)]
impl SessionStore for MemoryStore {
    fn load_all(&self) -> Vec<SessionRecord> {
        self.records()
    }

    fn append_one(&self, record: &SessionRecord) -> Result<()> {
        if self.fail_writes {
            return Err(self.write_error());
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn write_weekly_export(&self, records: &[SessionRecord], week_ending: NaiveDate) -> Result<PathBuf> {
        // Attempts are recorded even when they fail.
        self.exports
            .lock()
            .unwrap()
            .push((week_ending, records.to_vec()));
        if self.fail_writes {
            return Err(self.write_error());
        }
        Ok(PathBuf::from(format!("weekly_{}.csv", week_ending)))
    }

    fn master_csv_path(&self) -> &Path {
        &self.master_csv
    }
}
