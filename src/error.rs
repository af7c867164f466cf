// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Error type shared by every `tt` module.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, TrackerError>;

/// All errors that can occur while tracking, persisting or exporting sessions.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: malformed JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: CSV write failed: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("home directory not found (set HOME or TT_HOME)")]
    HomeNotFound,

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("could not install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

impl TrackerError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TrackerError::Io {
            path: path.into(),
            source,
        }
    }
}
