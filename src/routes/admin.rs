// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Administrator routes. Role checks happen in `AdminService`.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{AppointmentWithDetails, TeacherAppointmentSummary, User};
use crate::routes::api::snapshot_events;
use crate::services::admin::{AppointmentReportQuery, DashboardStats, UserListQuery};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::Utc;
use futures_util::Stream;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/stats", get(get_stats))
        .route("/api/admin/reports/teachers", get(teacher_report))
        .route("/api/admin/reports/appointments", get(appointments_report))
        .route("/api/admin/appointments/recent", get(recent_appointments))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/stream", get(stream_users))
        .route("/api/admin/users/{id}/active", put(set_user_active))
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DashboardStats>> {
    Ok(Json(state.admin.dashboard(&user, Utc::now()).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeacherReportQuery {
    #[serde(default)]
    teacher_id: Option<String>,
}

async fn teacher_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<TeacherReportQuery>,
) -> Result<Json<Vec<TeacherAppointmentSummary>>> {
    let report = state
        .admin
        .teacher_report(&user, params.teacher_id.as_deref())
        .await?;
    Ok(Json(report))
}

async fn appointments_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<AppointmentReportQuery>,
) -> Result<Json<Vec<AppointmentWithDetails>>> {
    Ok(Json(state.admin.appointments_report(&user, &params).await?))
}

#[derive(Deserialize)]
struct RecentQuery {
    #[serde(default)]
    days: Option<i64>,
}

async fn recent_appointments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<AppointmentWithDetails>>> {
    let rows = state
        .admin
        .recent_appointments(&user, params.days, Utc::now())
        .await?;
    Ok(Json(rows))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<UserListQuery>,
) -> Result<Json<Vec<User>>> {
    Ok(Json(state.admin.users(&user, &params).await?))
}

async fn stream_users(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    Ok(snapshot_events(state.admin.watch_users(&user).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveBody {
    pub is_active: bool,
}

async fn set_user_active(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(user_id): Path<String>,
    Json(body): Json<SetActiveBody>,
) -> Result<Json<User>> {
    let updated = state
        .admin
        .set_user_active(&user, &user_id, body.is_active, Utc::now())
        .await?;
    Ok(Json(updated))
}
