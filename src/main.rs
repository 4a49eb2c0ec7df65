// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! School Appointments API Server
//!
//! Serves the scheduling API for tutors, teachers and administrators.

use school_appointments::{
    config::{Config, IdentityBackend, StoreBackend},
    db::{BoundedStore, FirestoreDb, MemoryDb, SchedulingStore},
    services::IdentityService,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting School Appointments API");

    let backend: Arc<dyn SchedulingStore> = match config.store_backend {
        StoreBackend::Firestore => {
            Arc::new(FirestoreDb::new(&config.firebase_project_id).await?)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };
    let store: Arc<dyn SchedulingStore> =
        Arc::new(BoundedStore::new(backend, config.store_timeout));
    tracing::info!(
        backend = ?config.store_backend,
        timeout_ms = config.store_timeout.as_millis() as u64,
        "Document store initialized"
    );

    let identity = match config.identity_backend {
        IdentityBackend::Firebase => IdentityService::new(&config)?,
        IdentityBackend::Memory => {
            tracing::warn!("Using in-memory identity provider");
            IdentityService::new_in_memory()
        }
    };

    let port = config.port;
    let state = Arc::new(AppState::new(config, store, Arc::new(identity)));

    // Build router
    let app = school_appointments::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("school_appointments=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
