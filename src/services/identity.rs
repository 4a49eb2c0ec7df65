// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider client (Firebase Authentication).
//!
//! Talks to the Identity Toolkit REST API for sign-up, password sign-in and
//! verification e-mails. An in-memory mode stands in for the provider in
//! tests and local runs.

use crate::config::Config;
use crate::error::AppError;
use anyhow::Context;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PRODUCTION_BASE_URL: &str = "https://identitytoolkit.googleapis.com";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated identity as seen by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub email_verified: bool,
}

/// A signed-in provider session.
#[derive(Debug, Clone)]
pub struct IdentitySession {
    pub principal: Principal,
    /// Provider ID token, needed for follow-up account calls
    pub id_token: String,
}

struct MemoryAccount {
    id: String,
    /// Test-only backend; never used with real credentials.
    password: String,
    email_verified: bool,
    verification_emails: u32,
}

enum IdentityMode {
    Firebase { base_url: String, api_key: String },
    InMemory { accounts: DashMap<String, MemoryAccount> },
}

/// Identity provider client.
pub struct IdentityService {
    http_client: reqwest::Client,
    mode: IdentityMode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    email: String,
    id_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email_verified: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: &'static str,
    id_token: &'a str,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Deserialize)]
struct ProviderError {
    message: String,
}

/// Map a provider error code to an application error.
fn map_provider_error(message: &str) -> AppError {
    // Codes may carry a suffix, e.g. "WEAK_PASSWORD : Password should be ..."
    let code = message.split(':').next().unwrap_or(message).trim();
    match code {
        "EMAIL_EXISTS" => AppError::Validation("Email is already registered".to_string()),
        "INVALID_EMAIL" => AppError::Validation("Invalid email address".to_string()),
        "WEAK_PASSWORD" => AppError::Validation("Password is too weak".to_string()),
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            AppError::InvalidCredentials
        }
        "USER_DISABLED" => AppError::AccountDisabled,
        _ => AppError::Identity(message.to_string()),
    }
}

impl IdentityService {
    /// Create a client from configuration.
    ///
    /// With FIREBASE_AUTH_EMULATOR_HOST set, requests go to the emulator and
    /// the API key may be a placeholder.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building identity HTTP client")?;

        let base_url = match &config.auth_emulator_host {
            Some(host) => format!("http://{}/identitytoolkit.googleapis.com", host),
            None => PRODUCTION_BASE_URL.to_string(),
        };

        tracing::info!(base_url = %base_url, "Initialized identity provider client");

        Ok(Self {
            http_client,
            mode: IdentityMode::Firebase {
                base_url,
                api_key: config.firebase_api_key.clone(),
            },
        })
    }

    /// Create an in-memory provider.
    pub fn new_in_memory() -> Self {
        Self {
            http_client: reqwest::Client::new(),
            mode: IdentityMode::InMemory {
                accounts: DashMap::new(),
            },
        }
    }

    /// Create an account and sign it in.
    pub async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentitySession, AppError> {
        match &self.mode {
            IdentityMode::Firebase { .. } => {
                let response: PasswordResponse = self
                    .call(
                        "accounts:signUp",
                        &PasswordRequest {
                            email,
                            password,
                            return_secure_token: true,
                        },
                    )
                    .await?;
                Ok(IdentitySession {
                    principal: Principal {
                        id: response.local_id,
                        email: response.email,
                        email_verified: false,
                    },
                    id_token: response.id_token,
                })
            }
            IdentityMode::InMemory { accounts } => {
                let key = email.trim().to_lowercase();
                let id = uuid::Uuid::new_v4().simple().to_string();
                match accounts.entry(key.clone()) {
                    Entry::Occupied(_) => return Err(map_provider_error("EMAIL_EXISTS")),
                    Entry::Vacant(vacant) => {
                        vacant.insert(MemoryAccount {
                            id: id.clone(),
                            password: password.to_string(),
                            email_verified: false,
                            verification_emails: 0,
                        });
                    }
                }
                Ok(IdentitySession {
                    principal: Principal {
                        id: id.clone(),
                        email: key,
                        email_verified: false,
                    },
                    id_token: memory_token(&id),
                })
            }
        }
    }

    /// Verify a password and return the provider's view of the account.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<IdentitySession, AppError> {
        match &self.mode {
            IdentityMode::Firebase { .. } => {
                let response: PasswordResponse = self
                    .call(
                        "accounts:signInWithPassword",
                        &PasswordRequest {
                            email,
                            password,
                            return_secure_token: true,
                        },
                    )
                    .await?;

                // Sign-in does not report verification state; look it up.
                let lookup: LookupResponse = self
                    .call(
                        "accounts:lookup",
                        &LookupRequest {
                            id_token: &response.id_token,
                        },
                    )
                    .await?;
                let email_verified = lookup
                    .users
                    .iter()
                    .find(|u| u.local_id == response.local_id)
                    .is_some_and(|u| u.email_verified);

                Ok(IdentitySession {
                    principal: Principal {
                        id: response.local_id,
                        email: response.email,
                        email_verified,
                    },
                    id_token: response.id_token,
                })
            }
            IdentityMode::InMemory { accounts } => {
                let key = email.trim().to_lowercase();
                let account = accounts
                    .get(&key)
                    .filter(|a| a.password == password)
                    .ok_or(AppError::InvalidCredentials)?;
                Ok(IdentitySession {
                    principal: Principal {
                        id: account.id.clone(),
                        email: key.clone(),
                        email_verified: account.email_verified,
                    },
                    id_token: memory_token(&account.id),
                })
            }
        }
    }

    /// Ask the provider to send a verification e-mail.
    pub async fn send_verification_email(&self, session: &IdentitySession) -> Result<(), AppError> {
        match &self.mode {
            IdentityMode::Firebase { .. } => {
                let _: serde_json::Value = self
                    .call(
                        "accounts:sendOobCode",
                        &OobCodeRequest {
                            request_type: "VERIFY_EMAIL",
                            id_token: &session.id_token,
                        },
                    )
                    .await?;
            }
            IdentityMode::InMemory { accounts } => {
                if let Some(mut account) = accounts.get_mut(&session.principal.email) {
                    account.verification_emails += 1;
                }
            }
        }
        tracing::info!(user_id = %session.principal.id, "Verification email requested");
        Ok(())
    }

    /// Mark an in-memory account's e-mail as verified (the user clicked the
    /// link). No-op against Firebase.
    pub fn confirm_email(&self, email: &str) -> bool {
        match &self.mode {
            IdentityMode::InMemory { accounts } => {
                match accounts.get_mut(&email.trim().to_lowercase()) {
                    Some(mut account) => {
                        account.email_verified = true;
                        true
                    }
                    None => false,
                }
            }
            IdentityMode::Firebase { .. } => false,
        }
    }

    /// Verification e-mails sent to an in-memory account.
    pub fn verification_emails_sent(&self, email: &str) -> u32 {
        match &self.mode {
            IdentityMode::InMemory { accounts } => accounts
                .get(&email.trim().to_lowercase())
                .map_or(0, |a| a.verification_emails),
            IdentityMode::Firebase { .. } => 0,
        }
    }

    async fn call<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &Req,
    ) -> Result<Resp, AppError> {
        let IdentityMode::Firebase { base_url, api_key } = &self.mode else {
            return Err(AppError::Internal(anyhow::anyhow!(
                "identity REST call in in-memory mode"
            )));
        };

        let url = format!("{}/v1/{}", base_url, method);
        let response = self
            .http_client
            .post(&url)
            .query(&[("key", api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Identity(format!("{} request failed: {}", method, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ProviderErrorBody>(&text) {
                Ok(body) => map_provider_error(&body.error.message),
                Err(_) => AppError::Identity(format!("HTTP {}: {}", status, text)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Identity(format!("JSON parse error: {}", e)))
    }
}

fn memory_token(id: &str) -> String {
    format!("memory:{}", id)
}
