// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::Utc;
use school_appointments::config::Config;
use school_appointments::db::{BoundedStore, FirestoreDb, MemoryDb, SchedulingStore};
use school_appointments::middleware::auth::create_jwt;
use school_appointments::middleware::AuthUser;
use school_appointments::models::{Role, Slot, User};
use school_appointments::routes::create_router;
use school_appointments::services::IdentityService;
use school_appointments::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Offline app: in-memory store behind the timeout wrapper, in-memory
/// identity provider.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryDb>,
    pub identity: Arc<IdentityService>,
}

/// Create a test app with offline dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let config = Config::test_default();
    let store = Arc::new(MemoryDb::new());
    let bounded: Arc<dyn SchedulingStore> =
        Arc::new(BoundedStore::new(store.clone(), config.store_timeout));
    let identity = Arc::new(IdentityService::new_in_memory());

    let state = Arc::new(AppState::new(config, bounded, identity.clone()));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        identity,
    }
}

#[allow(dead_code)]
pub fn slot(date: &str, time: &str) -> Slot {
    Slot::parse(date, time).expect("valid slot")
}

#[allow(dead_code)]
pub fn principal(user_id: &str, role: Role) -> AuthUser {
    AuthUser {
        user_id: user_id.to_string(),
        role,
    }
}

/// Store an active, verified user profile.
#[allow(dead_code)]
pub async fn seed_user(store: &MemoryDb, id: &str, role: Role, name: &str) -> User {
    let mut user = User::new(
        id.to_string(),
        role,
        name.to_string(),
        format!("{}@example.com", id),
        Utc::now(),
    );
    user.email_verified = true;
    if role == Role::Teacher {
        user.subject = Some("Mathematics".to_string());
    }
    store.upsert_user(&user).await.expect("seed user");
    user
}

/// Store a teacher that publishes `slots`.
#[allow(dead_code)]
pub async fn seed_teacher(store: &MemoryDb, id: &str, name: &str, slots: Vec<Slot>) -> User {
    let mut teacher = seed_user(store, id, Role::Teacher, name).await;
    teacher.available_slots = slots;
    store.upsert_user(&teacher).await.expect("seed teacher");
    teacher
}

/// `Authorization` header value for a session of `user_id`.
#[allow(dead_code)]
pub fn bearer(state: &AppState, user_id: &str, role: Role) -> String {
    let token = create_jwt(user_id, role, &state.config.jwt_signing_key).expect("jwt");
    format!("Bearer {}", token)
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
