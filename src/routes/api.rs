// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Appointment, AppointmentStatus, Slot, User};
use crate::services::booking::{AppointmentTimeline, BookingRequest, TeacherSummary};
use crate::services::notifications::DeliveredNotification;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/teachers", get(list_teachers))
        .route(
            "/api/teachers/{id}/slots",
            get(get_effective_slots).put(put_available_slots),
        )
        .route(
            "/api/appointments",
            get(list_appointments).post(create_appointment),
        )
        .route("/api/appointments/stream", get(stream_appointments))
        .route("/api/appointments/{id}", get(get_appointment))
        .route("/api/appointments/{id}/status", post(change_status))
        .route("/api/notifications/stream", get(stream_notifications))
}

/// Turn a snapshot feed into server-sent events.
///
/// Each snapshot is a `snapshot` event; a failed re-query is reported as an
/// `error` event and the feed carries on.
pub(crate) fn snapshot_events<T, S>(
    snapshots: S,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>
where
    T: Serialize + Send + 'static,
    S: Stream<Item = Result<T>> + Send + 'static,
{
    let events = snapshots.map(|snapshot| match snapshot {
        Ok(rows) => Event::default().event("snapshot").json_data(rows),
        Err(e) => Ok(Event::default().event("error").data(e.to_string())),
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

// ─── User Profile ────────────────────────────────────────────

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<User>> {
    let profile = state
        .store
        .get_user(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User profile".to_string()))?;
    Ok(Json(profile))
}

// ─── Availability ────────────────────────────────────────────

async fn list_teachers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TeacherSummary>>> {
    Ok(Json(state.booking.list_teachers().await?))
}

/// Slots currently bookable with a teacher.
async fn get_effective_slots(
    State(state): State<Arc<AppState>>,
    Path(teacher_id): Path<String>,
) -> Result<Json<Vec<Slot>>> {
    Ok(Json(state.booking.effective_slots(&teacher_id).await?))
}

#[derive(Deserialize)]
pub struct AvailableSlotsBody {
    pub slots: Vec<Slot>,
}

/// Replace the teacher's published slots.
async fn put_available_slots(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(teacher_id): Path<String>,
    Json(body): Json<AvailableSlotsBody>,
) -> Result<Json<Vec<Slot>>> {
    let slots = state
        .booking
        .set_available_slots(&user, &teacher_id, body.slots, Utc::now())
        .await?;
    Ok(Json(slots))
}

// ─── Appointments ────────────────────────────────────────────

/// The caller's appointments, split into upcoming and past.
async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AppointmentTimeline>> {
    Ok(Json(state.booking.timeline_for(&user, Utc::now()).await?))
}

async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Appointment>)> {
    let appointment = state.booking.book(&user, request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Appointment>> {
    Ok(Json(state.booking.get_appointment(&user, &id).await?))
}

#[derive(Deserialize)]
pub struct StatusChangeBody {
    pub status: AppointmentStatus,
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<StatusChangeBody>,
) -> Result<Json<Appointment>> {
    let appointment = state
        .booking
        .transition(&user, &id, body.status, Utc::now())
        .await?;
    Ok(Json(appointment))
}

// ─── Live Feeds ──────────────────────────────────────────────

async fn stream_appointments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    snapshot_events(state.booking.watch_appointments(&user))
}

/// Notifications addressed to the caller, as they are delivered.
async fn stream_notifications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let receiver = state.notifier.subscribe();
    let recipient = user.user_id;

    let notifications = stream::unfold(receiver, move |mut receiver| {
        let recipient = recipient.clone();
        async move {
            loop {
                match receiver.recv().await {
                    Ok(n) if n.recipient == recipient => return Some((n, receiver)),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Notification stream lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
    });

    let events = notifications
        .map(|n: DeliveredNotification| Event::default().event("notification").json_data(n));
    Sse::new(events).keep_alive(KeepAlive::default())
}
