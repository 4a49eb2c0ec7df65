// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Deadline wrapper around a [`SchedulingStore`].

use crate::db::{AppointmentFilter, SchedulingStore, UserFilter, UserPatch};
use crate::error::{AppError, Result};
use crate::models::{Appointment, StatusChange, TransitionOutcome, User};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Fails any store call that takes longer than `timeout` with
/// `StoreUnavailable`.
///
/// A timed-out write may still have been applied by the backend.
pub struct BoundedStore {
    inner: Arc<dyn SchedulingStore>,
    timeout: Duration,
}

impl BoundedStore {
    pub fn new(inner: Arc<dyn SchedulingStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Store call timed out");
                Err(AppError::StoreUnavailable(format!("{} timed out", op)))
            }
        }
    }
}

#[async_trait]
impl SchedulingStore for BoundedStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.bounded("get_user", self.inner.get_user(user_id)).await
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.bounded("upsert_user", self.inner.upsert_user(user)).await
    }

    async fn update_user(&self, user_id: &str, patch: &UserPatch) -> Result<User> {
        self.bounded("update_user", self.inner.update_user(user_id, patch))
            .await
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        self.bounded("list_users", self.inner.list_users(filter)).await
    }

    async fn get_appointment(&self, appointment_id: &str) -> Result<Option<Appointment>> {
        self.bounded("get_appointment", self.inner.get_appointment(appointment_id))
            .await
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>> {
        self.bounded("list_appointments", self.inner.list_appointments(filter))
            .await
    }

    async fn claim_and_insert(&self, appointment: &Appointment) -> Result<()> {
        self.bounded("claim_and_insert", self.inner.claim_and_insert(appointment))
            .await
    }

    async fn apply_transition(&self, change: &StatusChange) -> Result<TransitionOutcome> {
        self.bounded("apply_transition", self.inner.apply_transition(change))
            .await
    }
}
