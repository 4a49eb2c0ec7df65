// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Teacher-published time slot.

use crate::error::{AppError, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A bookable `(date, time)` pair. The pair itself is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Slot {
    /// Calendar date ("YYYY-MM-DD")
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub date: NaiveDate,
    /// Local time of day ("HH:MM")
    #[serde(with = "hhmm")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub time: NaiveTime,
}

impl Slot {
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self { date, time }
    }

    /// Parse a slot from its stored string form.
    pub fn parse(date: &str, time: &str) -> Result<Self> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| AppError::Validation(format!("Invalid slot date: {date:?}")))?;
        let time = hhmm::parse(time.trim())
            .ok_or_else(|| AppError::Validation(format!("Invalid slot time: {time:?}")))?;
        Ok(Self { date, time })
    }

    /// Instant the slot starts, interpreting its wall-clock time in `offset`.
    pub fn starts_at(&self, offset: FixedOffset) -> Option<DateTime<Utc>> {
        offset
            .from_local_datetime(&self.date.and_time(self.time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.date.format("%Y-%m-%d"), self.time.format("%H:%M"))
    }
}

/// Remove repeated `(date, time)` pairs, keeping the first occurrence.
pub fn dedup_slots(slots: Vec<Slot>) -> Vec<Slot> {
    let mut seen = std::collections::HashSet::with_capacity(slots.len());
    slots.into_iter().filter(|slot| seen.insert(*slot)).collect()
}

/// Serde adapter for "HH:MM" times. Seconds are accepted on read and dropped.
pub mod hhmm {
    use chrono::{NaiveTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time of day: {raw:?}")))
    }

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
            .and_then(|t| t.with_second(0))
    }
}
