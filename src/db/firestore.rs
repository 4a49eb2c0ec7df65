// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profiles, published slots, activation)
//! - Appointments (booking and status changes)
//! - Slot claims (one document per held `(teacher, date, time)` triple)

use crate::db::{
    collections, AppointmentFilter, SchedulingStore, SlotClaim, UserFilter, UserPatch,
};
use crate::error::AppError;
use crate::models::{Appointment, StatusChange, TransitionOutcome, User};
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::{FirestoreConsistencySelector, FirestoreTransaction, FirestoreWritePrecondition};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

/// Map a Firestore error, keeping parse failures distinct from outages.
fn store_error(context: &str, e: FirestoreError) -> AppError {
    match e {
        FirestoreError::DeserializeError(err) => {
            AppError::MalformedDocument(format!("{}: {}", context, err))
        }
        other => AppError::StoreUnavailable(format!("{}: {}", context, other)),
    }
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator takes unauthenticated connections; skip local
        // credential lookup entirely.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a disconnected client. Every operation fails with
    /// `StoreUnavailable`.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client.as_ref().ok_or_else(|| {
            AppError::StoreUnavailable("Database not connected (offline mode)".to_string())
        })
    }

    /// A view of the database whose reads run inside `transaction`.
    fn in_transaction(
        &self,
        transaction: &FirestoreTransaction<'_>,
    ) -> Result<firestore::FirestoreDb, AppError> {
        Ok(self
            .get_client()?
            .clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            )))
    }

    async fn get_claim(&self, claim_id: &str) -> Result<Option<SlotClaim>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SLOT_CLAIMS)
            .obj()
            .one(claim_id)
            .await
            .map_err(|e| store_error("read slot claim", e))
    }
}

#[async_trait]
impl SchedulingStore for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| store_error("read user", e))
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        // The document id carries the user id.
        let stored = User {
            id: String::new(),
            ..user.clone()
        };
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(&stored)
            .execute()
            .await
            .map_err(|e| store_error("write user", e))?;
        Ok(())
    }

    async fn update_user(&self, user_id: &str, patch: &UserPatch) -> Result<User, AppError> {
        let mut user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        patch.apply(&mut user);

        let fields = patch.field_paths();
        if fields.is_empty() {
            return Ok(user);
        }

        let stored = User {
            id: String::new(),
            ..user.clone()
        };
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields)
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(user_id)
            .object(&stored)
            .execute()
            .await
            .map_err(|e| store_error("update user", e))?;

        Ok(user)
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        // Only the role is pushed down: legacy documents omit isActive.
        let role = filter.role.map(|r| r.as_str());
        let users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([role.and_then(|r| q.field("role").eq(r))]))
            .obj()
            .query()
            .await
            .map_err(|e| store_error("query users", e))?;

        Ok(users.into_iter().filter(|u| filter.matches(u)).collect())
    }

    // ─── Appointment Operations ──────────────────────────────────

    async fn get_appointment(&self, appointment_id: &str) -> Result<Option<Appointment>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::APPOINTMENTS)
            .obj()
            .one(appointment_id)
            .await
            .map_err(|e| store_error("read appointment", e))
    }

    async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, AppError> {
        // Equality filters only; ranges and statuses are applied after the
        // read so no composite index is needed.
        let tutor_id = filter.tutor_id.clone();
        let teacher_id = filter.teacher_id.clone();
        let appointments: Vec<Appointment> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::APPOINTMENTS)
            .filter(move |q| {
                q.for_all([
                    tutor_id.as_ref().and_then(|id| q.field("tutorId").eq(id.as_str())),
                    teacher_id
                        .as_ref()
                        .and_then(|id| q.field("docenteId").eq(id.as_str())),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| store_error("query appointments", e))?;

        Ok(appointments
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect())
    }

    // ─── Atomic Booking ──────────────────────────────────────────

    /// Create the slot claim and the appointment in one transaction.
    ///
    /// The claim is written with an exists=false precondition, so two
    /// concurrent bookings of one triple cannot both commit.
    async fn claim_and_insert(&self, appointment: &Appointment) -> Result<(), AppError> {
        let client = self.get_client()?;
        let claim = SlotClaim::for_appointment(appointment);
        let claim_id = claim.document_id();

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| store_error("begin booking transaction", e))?;

        let existing: Option<SlotClaim> = self
            .in_transaction(&transaction)?
            .fluent()
            .select()
            .by_id_in(collections::SLOT_CLAIMS)
            .obj()
            .one(&claim_id)
            .await
            .map_err(|e| store_error("read slot claim in transaction", e))?;

        if let Some(existing) = existing {
            tracing::debug!(
                claim_id = %claim_id,
                holder = %existing.appointment_id,
                "Slot already claimed"
            );
            let _ = transaction.rollback().await;
            return Err(AppError::SlotTaken);
        }

        client
            .fluent()
            .update()
            .in_col(collections::SLOT_CLAIMS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&claim_id)
            .object(&claim)
            .add_to_transaction(&mut transaction)
            .map_err(|e| store_error("add slot claim to transaction", e))?;

        let stored = Appointment {
            id: String::new(),
            ..appointment.clone()
        };
        client
            .fluent()
            .update()
            .in_col(collections::APPOINTMENTS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&appointment.id)
            .object(&stored)
            .add_to_transaction(&mut transaction)
            .map_err(|e| store_error("add appointment to transaction", e))?;

        if let Err(e) = transaction.commit().await {
            // A failed precondition means a concurrent booking won the claim.
            if self.get_claim(&claim_id).await?.is_some() {
                return Err(AppError::SlotTaken);
            }
            return Err(store_error("commit booking", e));
        }

        tracing::info!(
            appointment_id = %appointment.id,
            claim_id = %claim_id,
            "Appointment booked"
        );

        Ok(())
    }

    // ─── Status Transitions ──────────────────────────────────────

    async fn apply_transition(&self, change: &StatusChange) -> Result<TransitionOutcome, AppError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| store_error("begin transition transaction", e))?;
        let tx_db = self.in_transaction(&transaction)?;

        let current: Option<Appointment> = tx_db
            .fluent()
            .select()
            .by_id_in(collections::APPOINTMENTS)
            .obj()
            .one(&change.appointment_id)
            .await
            .map_err(|e| store_error("read appointment in transaction", e))?;

        let Some(mut appointment) = current else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound(format!(
                "Appointment {}",
                change.appointment_id
            )));
        };

        if appointment.status != change.from {
            let _ = transaction.rollback().await;
            return Ok(TransitionOutcome::Stale(appointment));
        }

        appointment.apply(change);

        let stored = Appointment {
            id: String::new(),
            ..appointment.clone()
        };
        client
            .fluent()
            .update()
            .in_col(collections::APPOINTMENTS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(&change.appointment_id)
            .object(&stored)
            .add_to_transaction(&mut transaction)
            .map_err(|e| store_error("add appointment update to transaction", e))?;

        if !change.to.is_active() {
            let claim_id = SlotClaim::for_appointment(&appointment).document_id();
            let claim: Option<SlotClaim> = tx_db
                .fluent()
                .select()
                .by_id_in(collections::SLOT_CLAIMS)
                .obj()
                .one(&claim_id)
                .await
                .map_err(|e| store_error("read slot claim in transaction", e))?;

            if claim.is_some_and(|c| c.appointment_id == appointment.id) {
                client
                    .fluent()
                    .delete()
                    .from(collections::SLOT_CLAIMS)
                    .document_id(&claim_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| store_error("add claim release to transaction", e))?;
            }
        }

        transaction
            .commit()
            .await
            .map_err(|e| store_error("commit transition", e))?;

        tracing::info!(
            appointment_id = %change.appointment_id,
            from = %change.from,
            to = %change.to,
            "Appointment status changed"
        );

        Ok(TransitionOutcome::Applied(appointment))
    }
}
