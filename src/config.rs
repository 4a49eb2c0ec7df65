// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use crate::time_utils::offset_from_minutes;
use chrono::FixedOffset;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which document store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// In-process store; data is lost on restart
    Memory,
}

/// Which identity provider authenticates users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityBackend {
    Firebase,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Firebase/GCP project ID
    pub firebase_project_id: String,
    /// Web API key for the Identity Toolkit REST API
    pub firebase_api_key: String,
    /// Auth emulator host:port, if running against the emulator
    pub auth_emulator_host: Option<String>,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,
    pub identity_backend: IdentityBackend,
    /// Deadline for a single store call
    pub store_timeout: Duration,
    /// How often snapshot feeds re-query without a local change event
    pub watch_poll_interval: Duration,
    /// Offset used for calendar windows and slot start times
    pub local_utc_offset: FixedOffset,
    /// How long before an appointment the reminder fires
    pub reminder_lead: chrono::Duration,
    pub max_pending_notifications: usize,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Config for tests: in-memory backends and short timeouts.
    pub fn test_default() -> Self {
        Self {
            firebase_project_id: "test-project".to_string(),
            firebase_api_key: "test_api_key".to_string(),
            auth_emulator_host: None,
            frontend_url: "http://localhost:8081".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            identity_backend: IdentityBackend::Memory,
            store_timeout: Duration::from_millis(500),
            watch_poll_interval: Duration::from_millis(200),
            local_utc_offset: offset_from_minutes(0),
            reminder_lead: chrono::Duration::minutes(5),
            max_pending_notifications: 100,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let auth_emulator_host = env::var("FIREBASE_AUTH_EMULATOR_HOST").ok();

        let identity_backend = match env::var("IDENTITY_MODE").as_deref() {
            Ok("memory") => IdentityBackend::Memory,
            Ok("firebase") | Err(_) => IdentityBackend::Firebase,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    name: "IDENTITY_MODE",
                    value: other.to_string(),
                })
            }
        };

        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("firestore") | Err(_) => StoreBackend::Firestore,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        // The emulator and the in-memory provider accept any key.
        let firebase_api_key = match env::var("FIREBASE_API_KEY") {
            Ok(key) => key.trim().to_string(),
            Err(_) if auth_emulator_host.is_some() || identity_backend == IdentityBackend::Memory => {
                "emulator".to_string()
            }
            Err(_) => return Err(ConfigError::Missing("FIREBASE_API_KEY")),
        };

        Ok(Self {
            firebase_project_id: env::var("FIREBASE_PROJECT_ID")
                .map_err(|_| ConfigError::Missing("FIREBASE_PROJECT_ID"))?,
            firebase_api_key,
            auth_emulator_host,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            port: parse_or("PORT", 8080)?,
            store_backend,
            identity_backend,
            store_timeout: Duration::from_millis(parse_or("STORE_TIMEOUT_MS", 5000)?),
            watch_poll_interval: Duration::from_secs(parse_or("WATCH_POLL_SECS", 15)?),
            local_utc_offset: offset_from_minutes(parse_or("LOCAL_UTC_OFFSET_MINUTES", 0)?),
            reminder_lead: chrono::Duration::minutes(parse_or("REMINDER_LEAD_MINUTES", 5)?),
            max_pending_notifications: parse_or("MAX_PENDING_NOTIFICATIONS", 10_000)?,

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variables are process-global; keep every env mutation in
    // this one test.
    #[test]
    fn test_config_from_env() {
        env::set_var("FIREBASE_PROJECT_ID", "school-test");
        env::set_var("FIREBASE_API_KEY", "key");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("STORE_BACKEND", "memory");
        env::set_var("LOCAL_UTC_OFFSET_MINUTES", "-360");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.firebase_project_id, "school-test");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.store_timeout, Duration::from_millis(5000));
        assert_eq!(config.local_utc_offset.local_minus_utc(), -360 * 60);
        assert_eq!(config.port, 8080);

        env::set_var("STORE_TIMEOUT_MS", "soon");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "STORE_TIMEOUT_MS", .. }));
        env::remove_var("STORE_TIMEOUT_MS");
    }
}
