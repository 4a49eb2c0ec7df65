// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! User model for storage and API.

use crate::models::Slot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Application role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Stored as "docente" by the mobile app.
    #[serde(rename = "docente", alias = "teacher")]
    Teacher,
    Tutor,
    Admin,
}

impl Role {
    /// Value stored in the `role` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "docente",
            Role::Tutor => "tutor",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_active() -> bool {
    true
}

/// User profile stored in Firestore (`users/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identity-provider id, also the document id. Never written as a field.
    #[serde(alias = "_firestore_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    /// Only set for teachers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Published offer set (teachers only)
    #[serde(default)]
    pub available_slots: Vec<Slot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// A freshly registered user: unverified, active, no slots.
    pub fn new(id: String, role: Role, name: String, email: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            role,
            name,
            email,
            subject: None,
            email_verified: false,
            is_active: true,
            available_slots: Vec::new(),
            created_at: Some(now),
            updated_at: None,
            last_login: None,
        }
    }

    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }

    /// Whether the teacher currently publishes `slot`.
    pub fn offers(&self, slot: &Slot) -> bool {
        self.available_slots.contains(slot)
    }
}
