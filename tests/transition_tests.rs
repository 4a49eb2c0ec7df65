// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Appointment status machine tests.

use async_trait::async_trait;
use chrono::Utc;
use school_appointments::db::{AppointmentFilter, MemoryDb, SchedulingStore, UserFilter, UserPatch};
use school_appointments::error::{AppError, Result};
use school_appointments::models::{
    Appointment, AppointmentStatus, Role, StatusChange, TransitionOutcome, User,
};
use school_appointments::services::booking::{BookingRequest, BookingService};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod common;
use common::{create_test_app, principal, seed_teacher, seed_user, slot, TestApp};

/// Teacher `t1` offering 09:00 and 10:00, tutors `a` and `b`, and a pending
/// appointment of `a` at 09:00.
async fn booked_app() -> (TestApp, Appointment) {
    let app = create_test_app();
    seed_teacher(
        &app.store,
        "t1",
        "Ms. Rivera",
        vec![slot("2025-06-10", "09:00"), slot("2025-06-10", "10:00")],
    )
    .await;
    seed_user(&app.store, "a", Role::Tutor, "Tutor A").await;
    seed_user(&app.store, "b", Role::Tutor, "Tutor B").await;

    let appointment = app
        .state
        .booking
        .book(
            &principal("a", Role::Tutor),
            BookingRequest {
                teacher_id: "t1".to_string(),
                slot: slot("2025-06-10", "09:00"),
                reason: "checkup".to_string(),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    (app, appointment)
}

#[tokio::test]
async fn test_confirm_cancel_then_confirm_again_is_invalid() {
    let (app, appointment) = booked_app().await;
    let teacher = principal("t1", Role::Teacher);
    let tutor = principal("a", Role::Tutor);

    let confirmed = app
        .state
        .booking
        .transition(&teacher, &appointment.id, AppointmentStatus::Confirmed, Utc::now())
        .await
        .unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert!(confirmed.updated_at.is_some());

    let cancelled = app
        .state
        .booking
        .transition(&tutor, &appointment.id, AppointmentStatus::Cancelled, Utc::now())
        .await
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    let err = app
        .state
        .booking
        .transition(&teacher, &appointment.id, AppointmentStatus::Confirmed, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: AppointmentStatus::Cancelled,
            to: AppointmentStatus::Confirmed
        }
    ));
}

#[tokio::test]
async fn test_recancel_is_rejected() {
    let (app, appointment) = booked_app().await;
    let tutor = principal("a", Role::Tutor);

    app.state
        .booking
        .transition(&tutor, &appointment.id, AppointmentStatus::Cancelled, Utc::now())
        .await
        .unwrap();

    let err = app
        .state
        .booking
        .transition(&tutor, &appointment.id, AppointmentStatus::Cancelled, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_tutor_cannot_confirm() {
    let (app, appointment) = booked_app().await;

    let err = app
        .state
        .booking
        .transition(
            &principal("a", Role::Tutor),
            &appointment.id,
            AppointmentStatus::Confirmed,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let stored = app
        .state
        .booking
        .get_appointment(&principal("t1", Role::Teacher), &appointment.id)
        .await
        .unwrap();
    assert_eq!(stored.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn test_outsider_cannot_touch_or_read() {
    let (app, appointment) = booked_app().await;
    let outsider = principal("b", Role::Tutor);

    let err = app
        .state
        .booking
        .transition(&outsider, &appointment.id, AppointmentStatus::Cancelled, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = app
        .state
        .booking
        .get_appointment(&outsider, &appointment.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Admins can read any appointment.
    app.state
        .booking
        .get_appointment(&principal("root", Role::Admin), &appointment.id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pending_to_pending_is_invalid() {
    let (app, appointment) = booked_app().await;

    let err = app
        .state
        .booking
        .transition(
            &principal("t1", Role::Teacher),
            &appointment.id,
            AppointmentStatus::Pending,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_missing_appointment_is_not_found() {
    let (app, _) = booked_app().await;

    let err = app
        .state
        .booking
        .transition(
            &principal("t1", Role::Teacher),
            "does-not-exist",
            AppointmentStatus::Confirmed,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_timeline_splits_upcoming_and_past() {
    let (app, past) = booked_app().await;
    // Pending requests always count as upcoming; a confirmed one in the
    // past does not.
    app.state
        .booking
        .transition(
            &principal("t1", Role::Teacher),
            &past.id,
            AppointmentStatus::Confirmed,
            Utc::now(),
        )
        .await
        .unwrap();

    let future_date = (Utc::now() + chrono::Duration::days(10))
        .date_naive()
        .format("%Y-%m-%d")
        .to_string();
    app.state
        .booking
        .set_available_slots(
            &principal("t1", Role::Teacher),
            "t1",
            vec![slot("2025-06-10", "09:00"), slot(&future_date, "09:00")],
            Utc::now(),
        )
        .await
        .unwrap();
    let upcoming = app
        .state
        .booking
        .book(
            &principal("a", Role::Tutor),
            BookingRequest {
                teacher_id: "t1".to_string(),
                slot: slot(&future_date, "09:00"),
                reason: "grades".to_string(),
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let timeline = app
        .state
        .booking
        .timeline_for(&principal("a", Role::Tutor), Utc::now())
        .await
        .unwrap();
    assert_eq!(timeline.upcoming, vec![upcoming]);
    assert_eq!(timeline.past.len(), 1);
    assert_eq!(timeline.past[0].id, past.id);

    // The teacher sees the same appointments from their side.
    let teacher_view = app
        .state
        .booking
        .appointments_for(&principal("t1", Role::Teacher))
        .await
        .unwrap();
    assert_eq!(teacher_view.len(), 2);
    assert!(teacher_view[0].date > teacher_view[1].date);
}

/// Store where another party's status change lands just before the first
/// status write.
struct Interleaved {
    inner: Arc<MemoryDb>,
    interloper: AppointmentStatus,
    fired: AtomicBool,
}

#[async_trait]
impl SchedulingStore for Interleaved {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.inner.get_user(user_id).await
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.inner.upsert_user(user).await
    }

    async fn update_user(&self, user_id: &str, patch: &UserPatch) -> Result<User> {
        self.inner.update_user(user_id, patch).await
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        self.inner.list_users(filter).await
    }

    async fn get_appointment(&self, appointment_id: &str) -> Result<Option<Appointment>> {
        self.inner.get_appointment(appointment_id).await
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>> {
        self.inner.list_appointments(filter).await
    }

    async fn claim_and_insert(&self, appointment: &Appointment) -> Result<()> {
        self.inner.claim_and_insert(appointment).await
    }

    async fn apply_transition(&self, change: &StatusChange) -> Result<TransitionOutcome> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let other = StatusChange {
                to: self.interloper,
                ..change.clone()
            };
            self.inner.apply_transition(&other).await?;
        }
        self.inner.apply_transition(change).await
    }
}

fn interleaved_booking(app: &TestApp, interloper: AppointmentStatus) -> BookingService {
    let store = Interleaved {
        inner: Arc::clone(&app.store),
        interloper,
        fired: AtomicBool::new(false),
    };
    BookingService::new(
        Arc::new(store),
        Arc::clone(&app.state.notifier),
        app.state.changes.clone(),
        app.state.config.local_utc_offset,
        app.state.config.reminder_lead,
        app.state.config.watch_poll_interval,
    )
}

#[tokio::test]
async fn test_confirm_loses_to_concurrent_cancel() {
    let (app, appointment) = booked_app().await;
    let booking = interleaved_booking(&app, AppointmentStatus::Cancelled);

    // The stale read is re-checked: cancelled -> confirmed is not allowed.
    let err = booking
        .transition(
            &principal("t1", Role::Teacher),
            &appointment.id,
            AppointmentStatus::Confirmed,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: AppointmentStatus::Cancelled,
            to: AppointmentStatus::Confirmed,
        }
    ));

    let stored = app.store.get_appointment(&appointment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_retries_after_concurrent_confirm() {
    let (app, appointment) = booked_app().await;
    let booking = interleaved_booking(&app, AppointmentStatus::Confirmed);

    // Confirmed -> cancelled is still allowed, so the retry applies.
    let cancelled = booking
        .transition(
            &principal("a", Role::Tutor),
            &appointment.id,
            AppointmentStatus::Cancelled,
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancels_only_one_wins() {
    for _ in 0..20 {
        let (app, appointment) = booked_app().await;

        let mut handles = Vec::new();
        for (user, role) in [("a", Role::Tutor), ("t1", Role::Teacher)] {
            let state = Arc::clone(&app.state);
            let id = appointment.id.clone();
            handles.push(tokio::spawn(async move {
                state
                    .booking
                    .transition(
                        &principal(user, role),
                        &id,
                        AppointmentStatus::Cancelled,
                        Utc::now(),
                    )
                    .await
            }));
        }

        let mut applied = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(updated) => {
                    assert_eq!(updated.status, AppointmentStatus::Cancelled);
                    applied += 1;
                }
                Err(AppError::InvalidTransition { .. }) => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(rejected, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirm_and_cancel_end_cancelled() {
    for _ in 0..20 {
        let (app, appointment) = booked_app().await;

        let confirm = {
            let state = Arc::clone(&app.state);
            let id = appointment.id.clone();
            tokio::spawn(async move {
                state
                    .booking
                    .transition(
                        &principal("t1", Role::Teacher),
                        &id,
                        AppointmentStatus::Confirmed,
                        Utc::now(),
                    )
                    .await
            })
        };
        let cancel = {
            let state = Arc::clone(&app.state);
            let id = appointment.id.clone();
            tokio::spawn(async move {
                state
                    .booking
                    .transition(
                        &principal("a", Role::Tutor),
                        &id,
                        AppointmentStatus::Cancelled,
                        Utc::now(),
                    )
                    .await
            })
        };

        // Cancel always wins eventually; confirm only if it got in first.
        assert_eq!(
            cancel.await.unwrap().unwrap().status,
            AppointmentStatus::Cancelled
        );
        match confirm.await.unwrap() {
            Ok(updated) => assert_eq!(updated.status, AppointmentStatus::Confirmed),
            Err(AppError::InvalidTransition { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }

        let stored = app.store.get_appointment(&appointment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Cancelled);
    }
}
