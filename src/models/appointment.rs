// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Appointment model and its status state machine.

use crate::models::slot::hhmm;
use crate::models::Slot;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Maximum length of the booking reason, in characters.
pub const MAX_REASON_CHARS: usize = 200;

/// Appointment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// Which side of an appointment an actor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Teacher,
    Tutor,
}

impl AppointmentStatus {
    pub const ACTIVE: [AppointmentStatus; 2] =
        [AppointmentStatus::Pending, AppointmentStatus::Confirmed];

    /// Active appointments hold their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Parties allowed to take the edge `self -> to`, or `None` if the edge
    /// does not exist.
    pub fn allowed_parties(&self, to: AppointmentStatus) -> Option<&'static [Party]> {
        use AppointmentStatus::*;
        match (self, to) {
            (Pending, Confirmed) => Some(&[Party::Teacher]),
            (Pending, Cancelled) | (Confirmed, Cancelled) => Some(&[Party::Teacher, Party::Tutor]),
            _ => None,
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown appointment status: {other}")),
        }
    }
}

/// Appointment stored in Firestore (`appointments/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    /// Document id. Never written as a field.
    #[serde(alias = "_firestore_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub tutor_id: String,
    #[serde(rename = "docenteId")]
    pub teacher_id: String,
    /// Teacher display name captured at booking time
    #[serde(rename = "docenteName", default, skip_serializing_if = "Option::is_none")]
    pub teacher_name: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub time: NaiveTime,
    pub reason: String,
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn slot(&self) -> Slot {
        Slot::new(self.date, self.time)
    }

    /// Which party `user_id` is on, if any.
    pub fn party_of(&self, user_id: &str) -> Option<Party> {
        if self.teacher_id == user_id {
            Some(Party::Teacher)
        } else if self.tutor_id == user_id {
            Some(Party::Tutor)
        } else {
            None
        }
    }

    /// Apply an already-validated status change to this record.
    pub fn apply(&mut self, change: &StatusChange) {
        self.status = change.to;
        self.updated_at = Some(change.at);
        if change.to == AppointmentStatus::Cancelled {
            self.cancelled_at = Some(change.at);
        }
    }

    /// Upcoming from the tutor's point of view: every pending request, plus
    /// confirmed appointments that have not started yet.
    pub fn is_upcoming(&self, now: DateTime<Utc>, offset: FixedOffset) -> bool {
        match self.status {
            AppointmentStatus::Pending => true,
            AppointmentStatus::Confirmed => self.slot().starts_at(offset).map_or(true, |s| s >= now),
            AppointmentStatus::Cancelled => false,
        }
    }
}

/// A compare-and-set status change: applied only if the stored status is
/// still `from`.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub appointment_id: String,
    pub from: AppointmentStatus,
    pub to: AppointmentStatus,
    pub at: DateTime<Utc>,
}

/// Outcome of a compare-and-set status change.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied(Appointment),
    /// The stored status no longer matched; carries the fresh record.
    Stale(Appointment),
}
