// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Availability and booking.
//!
//! Handles:
//! - Publishing a teacher's offered slots
//! - Effective availability (offered slots minus active bookings)
//! - Booking, guarded by the store's atomic slot claim
//! - Appointment status transitions

use crate::db::{collections, AppointmentFilter, SchedulingStore, UserFilter, UserPatch};
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::appointment::MAX_REASON_CHARS;
use crate::models::slot::dedup_slots;
use crate::models::{
    Appointment, AppointmentStatus, Party, Role, Slot, StatusChange, TransitionOutcome, User,
};
use crate::services::notifications::{
    NotificationContent, NotificationDispatcher, NotificationHandle, Trigger,
};
use crate::services::watch::{snapshot_stream, ChangeFeed};
use chrono::{DateTime, FixedOffset, Utc};
use dashmap::DashMap;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Upper bound on a teacher's published slots.
pub const MAX_PUBLISHED_SLOTS: usize = 500;

/// Compare-and-set retries before a transition gives up.
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Offered slots that no active appointment holds, in published order.
pub fn compute_effective_slots(published: &[Slot], appointments: &[Appointment]) -> Vec<Slot> {
    let taken: HashSet<Slot> = appointments
        .iter()
        .filter(|a| a.status.is_active())
        .map(Appointment::slot)
        .collect();

    published
        .iter()
        .filter(|slot| !taken.contains(slot))
        .copied()
        .collect()
}

/// Booking request from a tutor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    #[serde(alias = "docenteId")]
    pub teacher_id: String,
    #[serde(flatten)]
    pub slot: Slot,
    pub reason: String,
}

/// Teacher entry for the tutor's picker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSummary {
    pub id: String,
    pub name: String,
    pub subject: Option<String>,
}

/// A user's appointments split by whether they are still ahead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AppointmentTimeline {
    pub upcoming: Vec<Appointment>,
    pub past: Vec<Appointment>,
}

/// Newest slot first; ties broken by id so the order is stable.
pub fn sort_newest_first(appointments: &mut [Appointment]) {
    appointments.sort_by(|a, b| {
        (b.date, b.time, &b.id).cmp(&(a.date, a.time, &a.id))
    });
}

/// Availability and booking operations.
pub struct BookingService {
    store: Arc<dyn SchedulingStore>,
    notifier: Arc<NotificationDispatcher>,
    changes: ChangeFeed,
    local_offset: FixedOffset,
    reminder_lead: chrono::Duration,
    watch_poll_interval: Duration,
    /// Pending reminder per appointment, so cancelling can withdraw it
    reminders: DashMap<String, NotificationHandle>,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        notifier: Arc<NotificationDispatcher>,
        changes: ChangeFeed,
        local_offset: FixedOffset,
        reminder_lead: chrono::Duration,
        watch_poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            changes,
            local_offset,
            reminder_lead,
            watch_poll_interval,
            reminders: DashMap::new(),
        }
    }

    /// Load the principal's profile; deactivated users may not act.
    async fn load_actor(&self, principal: &AuthUser) -> Result<User> {
        let user = self
            .store
            .get_user(&principal.user_id)
            .await?
            .ok_or_else(|| AppError::Forbidden("Unknown user".to_string()))?;
        if !user.is_active {
            return Err(AppError::AccountDisabled);
        }
        Ok(user)
    }

    async fn load_teacher(&self, teacher_id: &str) -> Result<User> {
        self.store
            .get_user(teacher_id)
            .await?
            .filter(User::is_teacher)
            .ok_or_else(|| AppError::NotFound(format!("Teacher {}", teacher_id)))
    }

    // ─── Availability ────────────────────────────────────────────

    /// Slots a tutor can currently book with `teacher_id`.
    pub async fn effective_slots(&self, teacher_id: &str) -> Result<Vec<Slot>> {
        let teacher = self.load_teacher(teacher_id).await?;
        let active = self
            .store
            .list_appointments(&AppointmentFilter::for_teacher(teacher_id).active())
            .await?;
        Ok(compute_effective_slots(&teacher.available_slots, &active))
    }

    /// Replace the teacher's published slots.
    ///
    /// Existing appointments are not touched, even if their slot is no
    /// longer offered.
    pub async fn set_available_slots(
        &self,
        principal: &AuthUser,
        teacher_id: &str,
        slots: Vec<Slot>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>> {
        if principal.user_id != teacher_id {
            return Err(AppError::Forbidden(
                "Only the teacher can publish their slots".to_string(),
            ));
        }
        let teacher = self.load_teacher(teacher_id).await?;
        if !teacher.is_active {
            return Err(AppError::AccountDisabled);
        }

        let slots = dedup_slots(slots);
        if slots.len() > MAX_PUBLISHED_SLOTS {
            return Err(AppError::Validation(format!(
                "At most {} slots can be published",
                MAX_PUBLISHED_SLOTS
            )));
        }

        let patch = UserPatch {
            available_slots: Some(slots),
            updated_at: Some(now),
            ..UserPatch::default()
        };
        let updated = self.store.update_user(teacher_id, &patch).await?;
        self.changes.publish(collections::USERS);

        tracing::info!(
            teacher_id,
            count = updated.available_slots.len(),
            "Published available slots"
        );
        Ok(updated.available_slots)
    }

    /// Active teachers, for the booking picker.
    pub async fn list_teachers(&self) -> Result<Vec<TeacherSummary>> {
        let mut teachers = self
            .store
            .list_users(&UserFilter {
                role: Some(Role::Teacher),
                active: Some(true),
                unverified_only: false,
            })
            .await?;
        teachers.sort_by(|a, b| b.name.cmp(&a.name));

        Ok(teachers
            .into_iter()
            .map(|t| TeacherSummary {
                id: t.id,
                name: t.name,
                subject: t.subject,
            })
            .collect())
    }

    // ─── Booking ─────────────────────────────────────────────────

    /// Book `request.slot` with a teacher on behalf of a tutor.
    pub async fn book(
        &self,
        principal: &AuthUser,
        request: BookingRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        let tutor = self.load_actor(principal).await?;
        if tutor.role != Role::Tutor {
            return Err(AppError::Forbidden(
                "Only tutors can book appointments".to_string(),
            ));
        }

        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation("A reason is required".to_string()));
        }
        if reason.chars().count() > MAX_REASON_CHARS {
            return Err(AppError::Validation(format!(
                "Reason must be at most {} characters",
                MAX_REASON_CHARS
            )));
        }

        let teacher = self.load_teacher(&request.teacher_id).await?;
        if !teacher.offers(&request.slot) {
            return Err(AppError::Validation(format!(
                "SlotNotOffered: {} is not offered by this teacher",
                request.slot
            )));
        }

        let appointment = Appointment {
            id: uuid::Uuid::new_v4().simple().to_string(),
            tutor_id: tutor.id.clone(),
            teacher_id: teacher.id.clone(),
            teacher_name: Some(teacher.name.clone()),
            date: request.slot.date,
            time: request.slot.time,
            reason: reason.to_string(),
            status: AppointmentStatus::Pending,
            observations: None,
            created_at: now,
            updated_at: None,
            cancelled_at: None,
        };

        self.store.claim_and_insert(&appointment).await?;
        self.changes.publish(collections::APPOINTMENTS);

        tracing::info!(
            appointment_id = %appointment.id,
            tutor_id = %appointment.tutor_id,
            teacher_id = %appointment.teacher_id,
            slot = %request.slot,
            "Appointment requested"
        );

        self.notify_booked(&appointment, &teacher, now);
        Ok(appointment)
    }

    /// Confirmation now and a reminder before the start. Best effort.
    fn notify_booked(&self, appointment: &Appointment, teacher: &User, now: DateTime<Utc>) {
        let confirmation = NotificationContent {
            title: "Appointment booked!".to_string(),
            body: format!(
                "With {} at {}. Reason: {}",
                teacher.name,
                appointment.time.format("%H:%M"),
                appointment.reason
            ),
            appointment_id: Some(appointment.id.clone()),
        };
        if let Err(e) =
            self.notifier
                .schedule_local(&appointment.tutor_id, confirmation, Trigger::Immediate)
        {
            tracing::warn!(appointment_id = %appointment.id, error = %e, "Booking notification not sent");
        }

        let Some(starts_at) = appointment.slot().starts_at(self.local_offset) else {
            return;
        };
        let remind_at = starts_at - self.reminder_lead;
        if remind_at <= now {
            tracing::debug!(appointment_id = %appointment.id, "Too close to start for a reminder");
            return;
        }

        let reminder = NotificationContent {
            title: format!(
                "Your appointment is in {} min",
                self.reminder_lead.num_minutes()
            ),
            body: "Tap to see the details".to_string(),
            appointment_id: Some(appointment.id.clone()),
        };
        match self
            .notifier
            .schedule_local(&appointment.tutor_id, reminder, Trigger::At(remind_at))
        {
            Ok(handle) => {
                self.prune_reminders();
                self.reminders.insert(appointment.id.clone(), handle);
            }
            Err(e) => {
                tracing::warn!(appointment_id = %appointment.id, error = %e, "Reminder not scheduled");
            }
        }
    }

    // ─── Status Transitions ──────────────────────────────────────

    /// Move an appointment to `to` on behalf of one of its parties.
    pub async fn transition(
        &self,
        principal: &AuthUser,
        appointment_id: &str,
        to: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        self.load_actor(principal).await?;
        let mut current = self
            .store
            .get_appointment(appointment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Appointment {}", appointment_id)))?;

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            authorize_transition(&current, &principal.user_id, to)?;

            let change = StatusChange {
                appointment_id: appointment_id.to_string(),
                from: current.status,
                to,
                at: now,
            };
            match self.store.apply_transition(&change).await? {
                TransitionOutcome::Applied(updated) => {
                    self.changes.publish(collections::APPOINTMENTS);
                    if to == AppointmentStatus::Cancelled {
                        self.withdraw_reminder(appointment_id);
                    }
                    tracing::info!(
                        appointment_id,
                        from = %change.from,
                        to = %to,
                        user_id = %principal.user_id,
                        "Appointment transitioned"
                    );
                    return Ok(updated);
                }
                TransitionOutcome::Stale(fresh) => {
                    tracing::debug!(
                        appointment_id,
                        expected = %change.from,
                        found = %fresh.status,
                        "Appointment changed underneath transition; re-evaluating"
                    );
                    current = fresh;
                }
            }
        }

        Err(AppError::StoreUnavailable(format!(
            "Appointment {} kept changing; try again",
            appointment_id
        )))
    }

    /// Forget reminders that have already fired.
    fn prune_reminders(&self) {
        self.reminders
            .retain(|_, handle| self.notifier.is_pending(*handle));
    }

    /// Appointment reminders still waiting to fire.
    pub fn pending_reminders(&self) -> usize {
        self.prune_reminders();
        self.reminders.len()
    }

    fn withdraw_reminder(&self, appointment_id: &str) {
        if let Some((_, handle)) = self.reminders.remove(appointment_id) {
            if self.notifier.cancel(handle) {
                tracing::debug!(appointment_id, "Withdrew appointment reminder");
            }
        }
    }

    // ─── Reads ───────────────────────────────────────────────────

    /// One appointment, visible to its parties and to admins.
    pub async fn get_appointment(
        &self,
        principal: &AuthUser,
        appointment_id: &str,
    ) -> Result<Appointment> {
        let appointment = self
            .store
            .get_appointment(appointment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Appointment {}", appointment_id)))?;

        if appointment.party_of(&principal.user_id).is_none() && !principal.is_admin() {
            return Err(AppError::Forbidden(
                "Not a party to this appointment".to_string(),
            ));
        }
        Ok(appointment)
    }

    /// The principal's appointments, newest first.
    pub async fn appointments_for(&self, principal: &AuthUser) -> Result<Vec<Appointment>> {
        let filter = filter_for(principal);
        let mut appointments = self.store.list_appointments(&filter).await?;
        sort_newest_first(&mut appointments);
        Ok(appointments)
    }

    /// The principal's appointments split into upcoming and past.
    pub async fn timeline_for(
        &self,
        principal: &AuthUser,
        now: DateTime<Utc>,
    ) -> Result<AppointmentTimeline> {
        let appointments = self.appointments_for(principal).await?;
        let (upcoming, past): (Vec<_>, Vec<_>) = appointments
            .into_iter()
            .partition(|a| a.is_upcoming(now, self.local_offset));
        Ok(AppointmentTimeline { upcoming, past })
    }

    /// Live feed of the principal's appointments.
    pub fn watch_appointments(
        &self,
        principal: &AuthUser,
    ) -> impl Stream<Item = Result<Vec<Appointment>>> + Send + 'static {
        let store = self.store.clone();
        let filter = filter_for(principal);
        snapshot_stream(
            &self.changes,
            collections::APPOINTMENTS,
            self.watch_poll_interval,
            move || {
                let store = store.clone();
                let filter = filter.clone();
                async move {
                    let mut appointments = store.list_appointments(&filter).await?;
                    sort_newest_first(&mut appointments);
                    Ok(appointments)
                }
            },
        )
    }
}

/// Appointments a principal sees: their own, or everything for admins.
fn filter_for(principal: &AuthUser) -> AppointmentFilter {
    match principal.role {
        Role::Tutor => AppointmentFilter::for_tutor(&principal.user_id),
        Role::Teacher => AppointmentFilter::for_teacher(&principal.user_id),
        Role::Admin => AppointmentFilter::default(),
    }
}

/// Check `user_id` may move `appointment` to `to`.
///
/// Non-parties are rejected before the edge is considered, so outsiders
/// learn nothing about the appointment's state.
pub fn authorize_transition(
    appointment: &Appointment,
    user_id: &str,
    to: AppointmentStatus,
) -> Result<Party> {
    let party = appointment
        .party_of(user_id)
        .ok_or_else(|| AppError::Forbidden("Not a party to this appointment".to_string()))?;

    let allowed = appointment
        .status
        .allowed_parties(to)
        .ok_or(AppError::InvalidTransition {
            from: appointment.status,
            to,
        })?;

    if !allowed.contains(&party) {
        return Err(AppError::Forbidden(format!(
            "Only the teacher can move an appointment to {}",
            to
        )));
    }
    Ok(party)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn slot(date: &str, time: &str) -> Slot {
        Slot::parse(date, time).unwrap()
    }

    fn appointment_at(slot: Slot, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: format!("{}-{}", slot, status),
            tutor_id: "tutor".to_string(),
            teacher_id: "teacher".to_string(),
            teacher_name: None,
            date: slot.date,
            time: slot.time,
            reason: "checkup".to_string(),
            status,
            observations: None,
            created_at: Utc::now(),
            updated_at: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_effective_slots_exclude_active_only() {
        let nine = slot("2025-06-10", "09:00");
        let ten = slot("2025-06-10", "10:00");
        let eleven = slot("2025-06-10", "11:00");

        let appointments = vec![
            appointment_at(nine, AppointmentStatus::Pending),
            appointment_at(ten, AppointmentStatus::Cancelled),
            appointment_at(eleven, AppointmentStatus::Confirmed),
        ];

        let effective = compute_effective_slots(&[eleven, ten, nine], &appointments);
        assert_eq!(effective, vec![ten]);
    }

    #[test]
    fn test_effective_slots_ignore_unpublished_bookings() {
        let nine = slot("2025-06-10", "09:00");
        let orphan = appointment_at(slot("2025-06-11", "09:00"), AppointmentStatus::Pending);
        assert_eq!(compute_effective_slots(&[nine], &[orphan]), vec![nine]);
    }

    #[test]
    fn test_authorize_transition_order() {
        let pending = appointment_at(slot("2025-06-10", "09:00"), AppointmentStatus::Pending);

        assert_eq!(
            authorize_transition(&pending, "teacher", AppointmentStatus::Confirmed).unwrap(),
            Party::Teacher
        );
        assert!(matches!(
            authorize_transition(&pending, "tutor", AppointmentStatus::Confirmed),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize_transition(&pending, "stranger", AppointmentStatus::Cancelled),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize_transition(&pending, "tutor", AppointmentStatus::Pending),
            Err(AppError::InvalidTransition { .. })
        ));

        let cancelled = appointment_at(slot("2025-06-10", "09:00"), AppointmentStatus::Cancelled);
        assert!(matches!(
            authorize_transition(&cancelled, "tutor", AppointmentStatus::Cancelled),
            Err(AppError::InvalidTransition {
                from: AppointmentStatus::Cancelled,
                to: AppointmentStatus::Cancelled
            })
        ));
    }

    #[test]
    fn test_sort_newest_first() {
        let mut appointments = vec![
            appointment_at(slot("2025-06-10", "09:00"), AppointmentStatus::Pending),
            appointment_at(slot("2025-06-12", "09:00"), AppointmentStatus::Pending),
            appointment_at(slot("2025-06-10", "11:00"), AppointmentStatus::Pending),
        ];
        sort_newest_first(&mut appointments);
        let order: Vec<_> = appointments.iter().map(|a| (a.date.to_string(), a.time)).collect();
        assert_eq!(
            order,
            vec![
                ("2025-06-12".to_string(), NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
                ("2025-06-10".to_string(), NaiveTime::from_hms_opt(11, 0, 0).unwrap()),
                ("2025-06-10".to_string(), NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            ]
        );
    }

    #[test]
    fn test_booking_request_accepts_flat_slot() {
        let request: BookingRequest = serde_json::from_value(serde_json::json!({
            "docenteId": "t1",
            "date": "2025-06-10",
            "time": "09:00",
            "reason": "checkup"
        }))
        .unwrap();
        assert_eq!(request.teacher_id, "t1");
        assert_eq!(request.slot, slot("2025-06-10", "09:00"));
    }
}
