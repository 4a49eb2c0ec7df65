// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Aggregate statistics for the admin dashboard.
//!
//! Everything here is computed in memory from full collection reads; the
//! collections are small enough that no pre-aggregation is stored.

use crate::models::{Appointment, AppointmentStatus, Role, User};
use crate::time_utils::DateWindows;
use serde::Serialize;
use std::collections::HashMap;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Shown when an appointment's tutor cannot be resolved.
pub const UNKNOWN_USER_NAME: &str = "Unknown user";

/// User counts by role and status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: u32,
    pub total_teachers: u32,
    pub total_tutors: u32,
    pub total_admins: u32,
    pub verified_users: u32,
    pub unverified_users: u32,
    pub active_users: u32,
    pub inactive_users: u32,
}

impl UserStats {
    pub fn from_users(users: &[User]) -> Self {
        let mut stats = Self::default();
        for user in users {
            stats.total_users += 1;
            match user.role {
                Role::Teacher => stats.total_teachers += 1,
                Role::Tutor => stats.total_tutors += 1,
                Role::Admin => stats.total_admins += 1,
            }
            if user.email_verified {
                stats.verified_users += 1;
            } else {
                stats.unverified_users += 1;
            }
            if user.is_active {
                stats.active_users += 1;
            } else {
                stats.inactive_users += 1;
            }
        }
        stats
    }
}

/// Appointment counts by status and by date window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentStats {
    pub total_appointments: u32,
    pub pending_appointments: u32,
    pub confirmed_appointments: u32,
    pub cancelled_appointments: u32,
    pub today_appointments: u32,
    pub this_week_appointments: u32,
    pub this_month_appointments: u32,
}

impl AppointmentStats {
    /// Count appointments. Windows apply to the slot date.
    pub fn from_appointments(appointments: &[Appointment], windows: &DateWindows) -> Self {
        let mut stats = Self::default();
        for appointment in appointments {
            stats.record(appointment.status);
            if windows.today.contains(&appointment.date) {
                stats.today_appointments += 1;
            }
            if windows.week.contains(&appointment.date) {
                stats.this_week_appointments += 1;
            }
            if windows.month.contains(&appointment.date) {
                stats.this_month_appointments += 1;
            }
        }
        stats
    }

    fn record(&mut self, status: AppointmentStatus) {
        self.total_appointments += 1;
        match status {
            AppointmentStatus::Pending => self.pending_appointments += 1,
            AppointmentStatus::Confirmed => self.confirmed_appointments += 1,
            AppointmentStatus::Cancelled => self.cancelled_appointments += 1,
        }
    }
}

/// Appointment row for admin reports, with the tutor's name resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentWithDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub tutor_name: String,
}

impl AppointmentWithDetails {
    /// Attach tutor names from a user lookup table.
    pub fn enrich(appointments: Vec<Appointment>, users: &HashMap<&str, &User>) -> Vec<Self> {
        appointments
            .into_iter()
            .map(|appointment| {
                let tutor_name = users
                    .get(appointment.tutor_id.as_str())
                    .map(|u| u.name.clone())
                    .unwrap_or_else(|| UNKNOWN_USER_NAME.to_string());
                Self {
                    appointment,
                    tutor_name,
                }
            })
            .collect()
    }
}

/// Per-teacher report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAppointmentSummary {
    pub teacher_id: String,
    pub teacher_name: String,
    pub subject: Option<String>,
    pub total_appointments: u32,
    pub pending_appointments: u32,
    pub confirmed_appointments: u32,
    pub cancelled_appointments: u32,
    pub appointments: Vec<Appointment>,
}

impl TeacherAppointmentSummary {
    pub fn build(teacher: &User, appointments: &[Appointment]) -> Self {
        let mine: Vec<Appointment> = appointments
            .iter()
            .filter(|a| a.teacher_id == teacher.id)
            .cloned()
            .collect();

        let mut counts = AppointmentStats::default();
        for appointment in &mine {
            counts.record(appointment.status);
        }

        Self {
            teacher_id: teacher.id.clone(),
            teacher_name: teacher.name.clone(),
            subject: teacher.subject.clone(),
            total_appointments: counts.total_appointments,
            pending_appointments: counts.pending_appointments,
            confirmed_appointments: counts.confirmed_appointments,
            cancelled_appointments: counts.cancelled_appointments,
            appointments: mine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn make_appointment(id: &str, teacher: &str, date: &str, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: id.to_string(),
            tutor_id: "tutor-1".to_string(),
            teacher_id: teacher.to_string(),
            teacher_name: None,
            date: date.parse().unwrap(),
            time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            reason: "checkup".to_string(),
            status,
            observations: None,
            created_at: Utc::now(),
            updated_at: None,
            cancelled_at: None,
        }
    }

    fn make_user(id: &str, role: Role, verified: bool, active: bool) -> User {
        let mut user = User::new(
            id.to_string(),
            role,
            format!("User {id}"),
            format!("{id}@example.com"),
            Utc::now(),
        );
        user.email_verified = verified;
        user.is_active = active;
        user
    }

    #[test]
    fn test_user_stats_counts() {
        let users = vec![
            make_user("a", Role::Admin, true, true),
            make_user("b", Role::Teacher, true, true),
            make_user("c", Role::Teacher, false, false),
            make_user("d", Role::Tutor, false, true),
        ];

        let stats = UserStats::from_users(&users);

        assert_eq!(stats.total_users, 4);
        assert_eq!(stats.total_teachers, 2);
        assert_eq!(stats.total_tutors, 1);
        assert_eq!(stats.total_admins, 1);
        assert_eq!(stats.verified_users, 2);
        assert_eq!(stats.unverified_users, 2);
        assert_eq!(stats.active_users, 3);
        assert_eq!(stats.inactive_users, 1);
    }

    #[test]
    fn test_appointment_stats_windows() {
        // Wednesday 2025-06-11; week starts Sunday 2025-06-08.
        let windows = DateWindows::around(NaiveDate::from_ymd_opt(2025, 6, 11).unwrap());
        let appointments = vec![
            make_appointment("1", "t", "2025-06-11", AppointmentStatus::Pending),
            make_appointment("2", "t", "2025-06-08", AppointmentStatus::Confirmed),
            make_appointment("3", "t", "2025-06-15", AppointmentStatus::Cancelled),
            make_appointment("4", "t", "2025-06-30", AppointmentStatus::Pending),
            make_appointment("5", "t", "2025-07-01", AppointmentStatus::Pending),
        ];

        let stats = AppointmentStats::from_appointments(&appointments, &windows);

        assert_eq!(stats.total_appointments, 5);
        assert_eq!(stats.pending_appointments, 3);
        assert_eq!(stats.confirmed_appointments, 1);
        assert_eq!(stats.cancelled_appointments, 1);
        assert_eq!(stats.today_appointments, 1);
        assert_eq!(stats.this_week_appointments, 2);
        assert_eq!(stats.this_month_appointments, 4);
    }

    #[test]
    fn test_teacher_summary_only_counts_own_appointments() {
        let teacher = make_user("t1", Role::Teacher, true, true);
        let appointments = vec![
            make_appointment("1", "t1", "2025-06-11", AppointmentStatus::Pending),
            make_appointment("2", "t1", "2025-06-12", AppointmentStatus::Cancelled),
            make_appointment("3", "t2", "2025-06-12", AppointmentStatus::Confirmed),
        ];

        let summary = TeacherAppointmentSummary::build(&teacher, &appointments);

        assert_eq!(summary.total_appointments, 2);
        assert_eq!(summary.pending_appointments, 1);
        assert_eq!(summary.cancelled_appointments, 1);
        assert_eq!(summary.confirmed_appointments, 0);
        assert_eq!(summary.appointments.len(), 2);
    }

    #[test]
    fn test_enrich_falls_back_to_unknown() {
        let tutor = make_user("tutor-1", Role::Tutor, true, true);
        let mut orphan = make_appointment("2", "t", "2025-06-11", AppointmentStatus::Pending);
        orphan.tutor_id = "gone".to_string();
        let appointments = vec![
            make_appointment("1", "t", "2025-06-11", AppointmentStatus::Pending),
            orphan,
        ];
        let lookup: HashMap<&str, &User> = [(tutor.id.as_str(), &tutor)].into_iter().collect();

        let rows = AppointmentWithDetails::enrich(appointments, &lookup);

        assert_eq!(rows[0].tutor_name, "User tutor-1");
        assert_eq!(rows[1].tutor_name, UNKNOWN_USER_NAME);
    }
}
