// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Services talk to a [`SchedulingStore`]; the production backend is
//! Firestore, and [`MemoryDb`] keeps the same documents in process for tests
//! and local development. [`BoundedStore`] puts a deadline on every call.

pub mod bounded;
pub mod firestore;
pub mod memory;

pub use bounded::BoundedStore;
pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::Result;
use crate::models::slot::hhmm;
use crate::models::{
    Appointment, AppointmentStatus, Role, Slot, StatusChange, TransitionOutcome, User,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const APPOINTMENTS: &str = "appointments";
    /// One document per active `(docenteId, date, time)` triple
    pub const SLOT_CLAIMS: &str = "slot_claims";
}

/// Storage operations used by the service layer.
///
/// Implementations map transport failures to `AppError::StoreUnavailable`
/// and documents that fail to parse to `AppError::MalformedDocument`.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Create or fully replace a user document.
    async fn upsert_user(&self, user: &User) -> Result<()>;

    /// Apply a partial update. `NotFound` if the user does not exist.
    async fn update_user(&self, user_id: &str, patch: &UserPatch) -> Result<User>;

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>>;

    async fn get_appointment(&self, appointment_id: &str) -> Result<Option<Appointment>>;

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>>;

    /// Claim the appointment's slot and insert it in one atomic step.
    ///
    /// Fails with `SlotTaken` if an active appointment already holds the
    /// `(teacher, date, time)` triple.
    async fn claim_and_insert(&self, appointment: &Appointment) -> Result<()>;

    /// Compare-and-set a status change. Cancelling releases the slot claim
    /// in the same commit. `NotFound` if the appointment does not exist.
    async fn apply_transition(&self, change: &StatusChange) -> Result<TransitionOutcome>;
}

/// Lease on a `(teacher, date, time)` triple held by an active appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotClaim {
    #[serde(rename = "docenteId")]
    pub teacher_id: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub appointment_id: String,
    pub claimed_at: DateTime<Utc>,
}

impl SlotClaim {
    pub fn for_appointment(appointment: &Appointment) -> Self {
        Self {
            teacher_id: appointment.teacher_id.clone(),
            date: appointment.date,
            time: appointment.time,
            appointment_id: appointment.id.clone(),
            claimed_at: appointment.created_at,
        }
    }

    pub fn document_id(&self) -> String {
        claim_document_id(&self.teacher_id, &Slot::new(self.date, self.time))
    }
}

/// Document id of the claim for a teacher's slot.
///
/// The teacher id is percent-encoded; document ids may not contain `/`.
pub fn claim_document_id(teacher_id: &str, slot: &Slot) -> String {
    format!(
        "{}_{}_{}",
        urlencoding::encode(teacher_id),
        slot.date.format("%Y%m%d"),
        slot.time.format("%H%M")
    )
}

/// Partial user update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email_verified: Option<bool>,
    pub is_active: Option<bool>,
    pub available_slots: Option<Vec<Slot>>,
    pub last_login: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserPatch {
    pub fn apply(&self, user: &mut User) {
        if let Some(verified) = self.email_verified {
            user.email_verified = verified;
        }
        if let Some(active) = self.is_active {
            user.is_active = active;
        }
        if let Some(slots) = &self.available_slots {
            user.available_slots = slots.clone();
        }
        if let Some(at) = self.last_login {
            user.last_login = Some(at);
        }
        if let Some(at) = self.updated_at {
            user.updated_at = Some(at);
        }
    }

    /// Stored field names touched by this patch (for update masks).
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.email_verified.is_some() {
            paths.push("emailVerified");
        }
        if self.is_active.is_some() {
            paths.push("isActive");
        }
        if self.available_slots.is_some() {
            paths.push("availableSlots");
        }
        if self.last_login.is_some() {
            paths.push("lastLogin");
        }
        if self.updated_at.is_some() {
            paths.push("updatedAt");
        }
        paths
    }
}

/// User query. Empty filter matches everyone.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub active: Option<bool>,
    pub unverified_only: bool,
}

impl UserFilter {
    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Self::default()
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        self.role.is_none_or_eq(user.role)
            && self.active.is_none_or_eq(user.is_active)
            && (!self.unverified_only || !user.email_verified)
    }
}

/// Appointment query. Date bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub tutor_id: Option<String>,
    pub teacher_id: Option<String>,
    /// Empty means any status
    pub statuses: Vec<AppointmentStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub created_after: Option<DateTime<Utc>>,
}

impl AppointmentFilter {
    pub fn for_tutor(tutor_id: &str) -> Self {
        Self {
            tutor_id: Some(tutor_id.to_string()),
            ..Self::default()
        }
    }

    pub fn for_teacher(teacher_id: &str) -> Self {
        Self {
            teacher_id: Some(teacher_id.to_string()),
            ..Self::default()
        }
    }

    /// Only appointments that hold their slot.
    pub fn active(mut self) -> Self {
        self.statuses = AppointmentStatus::ACTIVE.to_vec();
        self
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.tutor_id
            .as_deref()
            .is_none_or_eq(appointment.tutor_id.as_str())
            && self
                .teacher_id
                .as_deref()
                .is_none_or_eq(appointment.teacher_id.as_str())
            && (self.statuses.is_empty() || self.statuses.contains(&appointment.status))
            && self.date_from.map_or(true, |from| appointment.date >= from)
            && self.date_to.map_or(true, |to| appointment.date <= to)
            && self
                .created_after
                .map_or(true, |after| appointment.created_at >= after)
    }
}

trait OptionEq<T> {
    fn is_none_or_eq(&self, value: T) -> bool;
}

impl<T: PartialEq> OptionEq<T> for Option<T> {
    fn is_none_or_eq(&self, value: T) -> bool {
        self.as_ref().map_or(true, |v| *v == value)
    }
}
