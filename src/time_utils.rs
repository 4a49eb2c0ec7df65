// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and local calendar windows.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, SecondsFormat, TimeZone, Utc,
};
use std::ops::Range;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Build a fixed offset from minutes east of UTC, falling back to UTC.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// Today's local calendar date at `now` in `offset`.
pub fn local_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    offset.from_utc_datetime(&now.naive_utc()).date_naive()
}

/// Half-open date ranges for "today", "this week" and "this month".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindows {
    pub today: Range<NaiveDate>,
    /// Weeks start on Sunday.
    pub week: Range<NaiveDate>,
    pub month: Range<NaiveDate>,
}

impl DateWindows {
    /// Windows around the local date of `now`.
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self::around(local_today(now, offset))
    }

    pub fn around(today: NaiveDate) -> Self {
        let tomorrow = today + Duration::days(1);

        let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
        let week_end = week_start + Duration::days(7);

        let month_start = today.with_day(1).unwrap_or(today);
        let month_end = if month_start.month() == 12 {
            NaiveDate::from_ymd_opt(month_start.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(month_start.year(), month_start.month() + 1, 1)
        }
        .unwrap_or(NaiveDate::MAX);

        Self {
            today: today..tomorrow,
            week: week_start..week_end,
            month: month_start..month_end,
        }
    }
}
