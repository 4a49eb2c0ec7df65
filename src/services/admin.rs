// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Administrator dashboard: statistics, reports and user management.
//!
//! Every operation requires an admin principal.

use crate::db::{collections, AppointmentFilter, SchedulingStore, UserFilter, UserPatch};
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{
    AppointmentStats, AppointmentStatus, AppointmentWithDetails, Role, TeacherAppointmentSummary,
    User, UserStats,
};
use crate::services::booking::sort_newest_first;
use crate::services::watch::{snapshot_stream, ChangeFeed};
use crate::time_utils::DateWindows;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Default look-back for recent appointments, in days.
pub const DEFAULT_RECENT_DAYS: i64 = 7;

/// Longest accepted look-back, in days.
pub const MAX_RECENT_DAYS: i64 = 3650;

/// Dashboard totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub users: UserStats,
    pub appointments: AppointmentStats,
}

/// Filters for the appointments report. Dates are inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentReportQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
}

/// Filters for the user list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub active: Option<bool>,
    #[serde(default)]
    pub unverified_only: bool,
}

impl From<&UserListQuery> for UserFilter {
    fn from(query: &UserListQuery) -> Self {
        UserFilter {
            role: query.role,
            active: query.active,
            unverified_only: query.unverified_only,
        }
    }
}

/// Most recently created first.
fn sort_by_created_desc(users: &mut [User]) {
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Read-side statistics and user management.
pub struct AdminService {
    store: Arc<dyn SchedulingStore>,
    changes: ChangeFeed,
    local_offset: FixedOffset,
    watch_poll_interval: Duration,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        changes: ChangeFeed,
        local_offset: FixedOffset,
        watch_poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            changes,
            local_offset,
            watch_poll_interval,
        }
    }

    /// Admin role in the token and an active admin profile in the store.
    async fn require_admin(&self, principal: &AuthUser) -> Result<()> {
        if !principal.is_admin() {
            return Err(AppError::Forbidden("Administrator access required".to_string()));
        }
        let admin = self
            .store
            .get_user(&principal.user_id)
            .await?
            .filter(|user| user.role == Role::Admin)
            .ok_or_else(|| AppError::Forbidden("Administrator access required".to_string()))?;
        if !admin.is_active {
            return Err(AppError::AccountDisabled);
        }
        Ok(())
    }

    async fn user_lookup(&self) -> Result<Vec<User>> {
        self.store.list_users(&UserFilter::default()).await
    }

    // ─── Statistics ──────────────────────────────────────────────

    pub async fn user_stats(&self, principal: &AuthUser) -> Result<UserStats> {
        self.require_admin(principal).await?;
        let users = self.user_lookup().await?;
        Ok(UserStats::from_users(&users))
    }

    /// Appointment counts; calendar windows are taken around `now` in the
    /// configured local offset.
    pub async fn appointment_stats(
        &self,
        principal: &AuthUser,
        now: DateTime<Utc>,
    ) -> Result<AppointmentStats> {
        self.require_admin(principal).await?;
        let appointments = self
            .store
            .list_appointments(&AppointmentFilter::default())
            .await?;
        let windows = DateWindows::at(now, self.local_offset);
        Ok(AppointmentStats::from_appointments(&appointments, &windows))
    }

    pub async fn dashboard(&self, principal: &AuthUser, now: DateTime<Utc>) -> Result<DashboardStats> {
        let (users, appointments) = tokio::try_join!(
            self.user_stats(principal),
            self.appointment_stats(principal, now)
        )?;
        Ok(DashboardStats {
            users,
            appointments,
        })
    }

    // ─── Reports ─────────────────────────────────────────────────

    /// Per-teacher totals, for one teacher or all of them.
    pub async fn teacher_report(
        &self,
        principal: &AuthUser,
        teacher_id: Option<&str>,
    ) -> Result<Vec<TeacherAppointmentSummary>> {
        self.require_admin(principal).await?;

        let (teachers, filter) = match teacher_id {
            Some(id) => {
                let teacher = self
                    .store
                    .get_user(id)
                    .await?
                    .filter(User::is_teacher)
                    .ok_or_else(|| AppError::NotFound(format!("Teacher {}", id)))?;
                (vec![teacher], AppointmentFilter::for_teacher(id))
            }
            None => {
                let mut teachers = self.store.list_users(&UserFilter::role(Role::Teacher)).await?;
                teachers.sort_by(|a, b| b.name.cmp(&a.name));
                (teachers, AppointmentFilter::default())
            }
        };

        let mut appointments = self.store.list_appointments(&filter).await?;
        sort_newest_first(&mut appointments);

        Ok(teachers
            .iter()
            .map(|teacher| TeacherAppointmentSummary::build(teacher, &appointments))
            .collect())
    }

    /// Appointments in a date range, with tutor names resolved.
    pub async fn appointments_report(
        &self,
        principal: &AuthUser,
        query: &AppointmentReportQuery,
    ) -> Result<Vec<AppointmentWithDetails>> {
        self.require_admin(principal).await?;
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if start > end {
                return Err(AppError::Validation(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }

        let filter = AppointmentFilter {
            statuses: query.status.into_iter().collect(),
            date_from: query.start_date,
            date_to: query.end_date,
            ..AppointmentFilter::default()
        };
        self.enriched(filter).await
    }

    /// Appointments created in the last `days` days, newest first.
    pub async fn recent_appointments(
        &self,
        principal: &AuthUser,
        days: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<AppointmentWithDetails>> {
        self.require_admin(principal).await?;
        let days = days.unwrap_or(DEFAULT_RECENT_DAYS);
        if !(1..=MAX_RECENT_DAYS).contains(&days) {
            return Err(AppError::Validation(format!(
                "days must be between 1 and {}",
                MAX_RECENT_DAYS
            )));
        }
        let since = chrono::Duration::try_days(days)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| AppError::Validation("days is out of range".to_string()))?;

        let filter = AppointmentFilter {
            created_after: Some(since),
            ..AppointmentFilter::default()
        };
        let mut rows = self.enriched(filter).await?;
        rows.sort_by(|a, b| b.appointment.created_at.cmp(&a.appointment.created_at));
        Ok(rows)
    }

    async fn enriched(&self, filter: AppointmentFilter) -> Result<Vec<AppointmentWithDetails>> {
        let (mut appointments, users) = tokio::try_join!(
            self.store.list_appointments(&filter),
            self.user_lookup()
        )?;
        sort_newest_first(&mut appointments);

        let lookup: HashMap<&str, &User> = users.iter().map(|u| (u.id.as_str(), u)).collect();
        Ok(AppointmentWithDetails::enrich(appointments, &lookup))
    }

    // ─── User Management ─────────────────────────────────────────

    pub async fn users(&self, principal: &AuthUser, query: &UserListQuery) -> Result<Vec<User>> {
        self.require_admin(principal).await?;
        let mut users = self.store.list_users(&query.into()).await?;
        sort_by_created_desc(&mut users);
        Ok(users)
    }

    /// Activate or deactivate a user. Deactivated users cannot log in.
    pub async fn set_user_active(
        &self,
        principal: &AuthUser,
        user_id: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<User> {
        self.require_admin(principal).await?;
        if user_id == principal.user_id && !active {
            return Err(AppError::Validation(
                "Administrators cannot deactivate themselves".to_string(),
            ));
        }

        let patch = UserPatch {
            is_active: Some(active),
            updated_at: Some(now),
            ..UserPatch::default()
        };
        let user = self.store.update_user(user_id, &patch).await?;
        self.changes.publish(collections::USERS);

        tracing::info!(
            user_id,
            active,
            admin_id = %principal.user_id,
            "User activation changed"
        );
        Ok(user)
    }

    /// Live feed of the full user list, newest first.
    pub async fn watch_users(
        &self,
        principal: &AuthUser,
    ) -> Result<BoxStream<'static, Result<Vec<User>>>> {
        self.require_admin(principal).await?;
        let store = self.store.clone();
        let feed = snapshot_stream(
            &self.changes,
            collections::USERS,
            self.watch_poll_interval,
            move || {
                let store = store.clone();
                async move {
                    let mut users = store.list_users(&UserFilter::default()).await?;
                    sort_by_created_desc(&mut users);
                    Ok(users)
                }
            },
        );
        Ok(feed.boxed())
    }
}
