// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! School appointments: tutor/teacher appointment scheduling backend.
//!
//! Teachers publish the slots they offer, tutors book them, and both sides
//! move appointments through a small status machine. Administrators get
//! statistics, reports and user management.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SchedulingStore;
use services::{
    AccountService, AdminService, BookingService, ChangeFeed, IdentityService,
    NotificationDispatcher,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn SchedulingStore>,
    pub notifier: Arc<NotificationDispatcher>,
    pub changes: ChangeFeed,
    pub accounts: AccountService,
    pub booking: BookingService,
    pub admin: AdminService,
}

impl AppState {
    /// Wire the services around a store and an identity provider.
    pub fn new(
        config: Config,
        store: Arc<dyn SchedulingStore>,
        identity: Arc<IdentityService>,
    ) -> Self {
        let changes = ChangeFeed::new();
        let notifier = Arc::new(NotificationDispatcher::new(config.max_pending_notifications));

        let accounts = AccountService::new(
            store.clone(),
            identity,
            changes.clone(),
            config.jwt_signing_key.clone(),
        );
        let booking = BookingService::new(
            store.clone(),
            notifier.clone(),
            changes.clone(),
            config.local_utc_offset,
            config.reminder_lead,
            config.watch_poll_interval,
        );
        let admin = AdminService::new(
            store.clone(),
            changes.clone(),
            config.local_utc_offset,
            config.watch_poll_interval,
        );

        Self {
            config,
            store,
            notifier,
            changes,
            accounts,
            booking,
            admin,
        }
    }
}
