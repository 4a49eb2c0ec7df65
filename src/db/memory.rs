// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store.
//!
//! Documents are kept in their serialized JSON form, so reads go through the
//! same parse boundary as Firestore reads and a corrupt document surfaces as
//! `MalformedDocument` here too.

use crate::db::{
    collections, AppointmentFilter, SchedulingStore, SlotClaim, UserFilter, UserPatch,
};
use crate::error::{AppError, Result};
use crate::models::{Appointment, StatusChange, TransitionOutcome, User};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Document store backed by concurrent hash maps.
#[derive(Default)]
pub struct MemoryDb {
    users: DashMap<String, Value>,
    appointments: DashMap<String, Value>,
    claims: DashMap<String, SlotClaim>,
    /// Artificial delay applied to every call (milliseconds)
    latency_ms: AtomicU64,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every subsequent call, to exercise timeouts.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Store a raw document, bypassing the typed models.
    pub fn insert_raw(&self, collection: &str, id: &str, document: Value) {
        match collection {
            collections::USERS => {
                self.users.insert(id.to_string(), document);
            }
            collections::APPOINTMENTS => {
                self.appointments.insert(id.to_string(), document);
            }
            other => tracing::warn!(collection = other, "Unknown collection for raw insert"),
        }
    }

    /// Number of live slot claims.
    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    let mut document = serde_json::to_value(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode document: {}", e)))?;
    // The id lives in the key, as with Firestore document ids.
    if let Value::Object(fields) = &mut document {
        fields.remove("id");
    }
    Ok(document)
}

fn decode<T: DeserializeOwned>(collection: &str, id: &str, document: &Value) -> Result<T> {
    let mut document = document.clone();
    if let Value::Object(fields) = &mut document {
        fields.insert("id".to_string(), Value::String(id.to_string()));
    }
    serde_json::from_value(document)
        .map_err(|e| AppError::MalformedDocument(format!("{}/{}: {}", collection, id, e)))
}

#[async_trait]
impl SchedulingStore for MemoryDb {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.simulate_latency().await;
        self.users
            .get(user_id)
            .map(|doc| decode(collections::USERS, user_id, doc.value()))
            .transpose()
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.simulate_latency().await;
        self.users.insert(user.id.clone(), encode(user)?);
        Ok(())
    }

    async fn update_user(&self, user_id: &str, patch: &UserPatch) -> Result<User> {
        self.simulate_latency().await;
        let mut entry = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        let mut user: User = decode(collections::USERS, user_id, entry.value())?;
        patch.apply(&mut user);
        *entry.value_mut() = encode(&user)?;
        Ok(user)
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        self.simulate_latency().await;
        let mut users = Vec::new();
        for doc in self.users.iter() {
            let user: User = decode(collections::USERS, doc.key(), doc.value())?;
            if filter.matches(&user) {
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn get_appointment(&self, appointment_id: &str) -> Result<Option<Appointment>> {
        self.simulate_latency().await;
        self.appointments
            .get(appointment_id)
            .map(|doc| decode(collections::APPOINTMENTS, appointment_id, doc.value()))
            .transpose()
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>> {
        self.simulate_latency().await;
        let mut appointments = Vec::new();
        for doc in self.appointments.iter() {
            let appointment: Appointment =
                decode(collections::APPOINTMENTS, doc.key(), doc.value())?;
            if filter.matches(&appointment) {
                appointments.push(appointment);
            }
        }
        Ok(appointments)
    }

    async fn claim_and_insert(&self, appointment: &Appointment) -> Result<()> {
        self.simulate_latency().await;
        let document = encode(appointment)?;
        let claim = SlotClaim::for_appointment(appointment);

        // The claim shard lock is released before the appointment map is
        // touched; transitions lock appointments first, then claims.
        match self.claims.entry(claim.document_id()) {
            Entry::Occupied(_) => return Err(AppError::SlotTaken),
            Entry::Vacant(vacant) => {
                vacant.insert(claim);
            }
        }

        self.appointments.insert(appointment.id.clone(), document);
        Ok(())
    }

    async fn apply_transition(&self, change: &StatusChange) -> Result<TransitionOutcome> {
        self.simulate_latency().await;
        let mut entry = self
            .appointments
            .get_mut(&change.appointment_id)
            .ok_or_else(|| AppError::NotFound(format!("Appointment {}", change.appointment_id)))?;

        let mut appointment: Appointment =
            decode(collections::APPOINTMENTS, entry.key(), entry.value())?;
        if appointment.status != change.from {
            return Ok(TransitionOutcome::Stale(appointment));
        }

        appointment.apply(change);
        let document = encode(&appointment)?;

        if !change.to.is_active() {
            let claim_id = SlotClaim::for_appointment(&appointment).document_id();
            self.claims
                .remove_if(&claim_id, |_, claim| claim.appointment_id == appointment.id);
        }
        *entry.value_mut() = document;

        Ok(TransitionOutcome::Applied(appointment))
    }
}
