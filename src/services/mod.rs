// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod accounts;
pub mod admin;
pub mod booking;
pub mod identity;
pub mod notifications;
pub mod watch;

pub use accounts::AccountService;
pub use admin::AdminService;
pub use booking::BookingService;
pub use identity::{IdentityService, Principal};
pub use notifications::NotificationDispatcher;
pub use watch::ChangeFeed;
