// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod appointment;
pub mod slot;
pub mod stats;
pub mod user;

pub use appointment::{Appointment, AppointmentStatus, Party, StatusChange, TransitionOutcome};
pub use slot::Slot;
pub use stats::{AppointmentStats, AppointmentWithDetails, TeacherAppointmentSummary, UserStats};
pub use user::{Role, User};
