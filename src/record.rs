// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! A completed session as it is stored on disk.
//!
//! ## JSON format
//!
//! `{"date": "DD-MM-YYYY", "start_time": "HH:MM:SS", "end_time": "HH:MM:SS", "duration": "8h0m"}`

use crate::clock::SessionDuration;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%d-%m-%Y";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Localized column headers for every CSV export.
pub const CSV_HEADERS: [&str; 4] = ["Dato", "Starttid", "Sluttid", "Varighed"];

/// Immutable once created. A session that crosses midnight belongs entirely to its start date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(with = "date_format")]
    pub date: NaiveDate,
    #[serde(with = "time_format")]
    pub start_time: NaiveTime,
    #[serde(with = "time_format")]
    pub end_time: NaiveTime,
    #[serde(with = "duration_format")]
    pub duration: SessionDuration,
}

impl SessionRecord {
    pub fn from_instants(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        // Sub-second precision is dropped so the stored times match the displayed ones.
        let start_time = start.time().with_nanosecond(0).unwrap_or(start.time());
        let end_time = end.time().with_nanosecond(0).unwrap_or(end.time());
        SessionRecord {
            date: start.date(),
            start_time,
            end_time,
            duration: SessionDuration::between(start, end),
        }
    }

    /// Row for the CSV exports, in [`CSV_HEADERS`] order.
    pub fn csv_row(&self) -> [String; 4] {
        [
            self.date.format(DATE_FORMAT).to_string(),
            self.start_time.format(TIME_FORMAT).to_string(),
            self.end_time.format(TIME_FORMAT).to_string(),
            self.duration.to_string(),
        ]
    }
}

mod date_format {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(d)?;
        NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

mod time_format {
    use super::TIME_FORMAT;
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format(TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(d)?;
        NaiveTime::parse_from_str(&s, TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

mod duration_format {
    use crate::clock::SessionDuration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &SessionDuration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(d)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SessionDuration, D::Error> {
        let s = String::deserialize(d)?;
        SessionDuration::parse(&s).map_err(serde::de::Error::custom)
    }
}
