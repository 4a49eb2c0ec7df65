// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware module.

pub mod auth;

pub use auth::{require_auth, AuthUser};
