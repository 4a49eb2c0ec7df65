// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Registration, login and session issuance.

use crate::db::{collections, SchedulingStore, UserPatch};
use crate::error::{AppError, Result};
use crate::middleware::auth::create_jwt;
use crate::models::{Role, User};
use crate::services::identity::IdentityService;
use crate::services::watch::ChangeFeed;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Characters that satisfy the password "special character" rule.
const PASSWORD_SPECIALS: &str = "!@#$%^&*/.-_";
const MIN_PASSWORD_CHARS: usize = 12;
const MAX_SUBJECT_CHARS: usize = 100;

/// Registration form.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_password"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub role: Role,
    /// Required for teachers, ignored otherwise
    pub subject: Option<String>,
}

/// Login form.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful login.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LoginResponse {
    /// Session JWT, also set as a cookie by the HTTP layer
    pub token: String,
    pub user: User,
}

/// Password policy: length, an uppercase letter, a digit and a special
/// character.
fn validate_password(password: &str) -> std::result::Result<(), ValidationError> {
    let fail = |msg: &'static str| {
        let mut err = ValidationError::new("password_policy");
        err.message = Some(msg.into());
        Err(err)
    };

    if password.chars().count() < MIN_PASSWORD_CHARS {
        return fail("Password must be at least 12 characters");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return fail("Password must contain an uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return fail("Password must contain a digit");
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return fail("Password must contain one of !@#$%^&*/.-_");
    }
    Ok(())
}

/// Account lifecycle against the identity provider and the user store.
pub struct AccountService {
    store: Arc<dyn SchedulingStore>,
    identity: Arc<IdentityService>,
    changes: ChangeFeed,
    jwt_signing_key: Vec<u8>,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        identity: Arc<IdentityService>,
        changes: ChangeFeed,
        jwt_signing_key: Vec<u8>,
    ) -> Self {
        Self {
            store,
            identity,
            changes,
            jwt_signing_key,
        }
    }

    /// Create the identity account and the user profile.
    ///
    /// The verification e-mail is best effort; a failure is logged and the
    /// user can ask for another one.
    pub async fn register(&self, request: RegisterRequest, now: DateTime<Utc>) -> Result<User> {
        request.validate()?;

        if request.role == Role::Admin {
            return Err(AppError::Forbidden(
                "Administrator accounts cannot be self-registered".to_string(),
            ));
        }

        let subject = match request.role {
            Role::Teacher => {
                let subject = request
                    .subject
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        AppError::Validation("Teachers must provide a subject".to_string())
                    })?;
                if subject.chars().count() > MAX_SUBJECT_CHARS {
                    return Err(AppError::Validation(format!(
                        "Subject must be 1-{} characters",
                        MAX_SUBJECT_CHARS
                    )));
                }
                Some(subject.to_string())
            }
            _ => None,
        };

        let email = request.email.trim().to_lowercase();
        let session = self.identity.create_account(&email, &request.password).await?;

        if let Err(e) = self.identity.send_verification_email(&session).await {
            tracing::warn!(user_id = %session.principal.id, error = %e, "Verification email not sent");
        }

        let mut user = User::new(
            session.principal.id.clone(),
            request.role,
            request.name.trim().to_string(),
            email,
            now,
        );
        user.subject = subject;

        if let Err(e) = self.store.upsert_user(&user).await {
            // The identity account exists without a profile; login will
            // report NotFound until the profile is written.
            tracing::error!(
                user_id = %user.id,
                email = %user.email,
                error = %e,
                "Identity account created but profile write failed"
            );
            return Err(e);
        }
        self.changes.publish(collections::USERS);

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// Authenticate and issue a session.
    pub async fn login(&self, request: LoginRequest, now: DateTime<Utc>) -> Result<LoginResponse> {
        let session = self
            .identity
            .sign_in(request.email.trim(), &request.password)
            .await?;
        let principal = session.principal;

        if !principal.email_verified {
            return Err(AppError::EmailNotVerified);
        }

        let user = self
            .store
            .get_user(&principal.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User profile".to_string()))?;

        if !user.is_active {
            tracing::info!(user_id = %user.id, "Login rejected for deactivated user");
            return Err(AppError::AccountDisabled);
        }

        let patch = UserPatch {
            // The provider is authoritative for verification.
            email_verified: (!user.email_verified).then_some(true),
            last_login: Some(now),
            ..UserPatch::default()
        };
        let user = self.store.update_user(&user.id, &patch).await?;
        if patch.email_verified.is_some() {
            self.changes.publish(collections::USERS);
        }

        let token = create_jwt(&user.id, user.role, &self.jwt_signing_key)?;

        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");
        Ok(LoginResponse { token, user })
    }

    /// Send another verification e-mail. Returns false if the address is
    /// already verified.
    pub async fn resend_verification(&self, request: LoginRequest) -> Result<bool> {
        let session = self
            .identity
            .sign_in(request.email.trim(), &request.password)
            .await?;
        if session.principal.email_verified {
            return Ok(false);
        }
        self.identity.send_verification_email(&session).await?;
        Ok(true)
    }
}
