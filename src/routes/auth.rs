// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Registration, login and session cookie routes.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::Result;
use crate::middleware::auth::SESSION_COOKIE;
use crate::models::User;
use crate::services::accounts::{LoginRequest, LoginResponse, RegisterRequest};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/resend-verification", post(resend_verification))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ResendVerificationResponse {
    pub sent: bool,
}

/// Session cookie; Secure unless the frontend is served from localhost.
fn session_cookie(token: String, frontend_url: &str) -> Cookie<'static> {
    let local = frontend_url.starts_with("http://localhost")
        || frontend_url.starts_with("http://127.0.0.1");
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(!local)
        .same_site(SameSite::Lax)
        .build()
}

/// Register a tutor or teacher. The account must verify its e-mail before
/// it can log in.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state.accounts.register(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Log in and set the session cookie. The token is also returned for
/// clients that send it as a Bearer header.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>)> {
    let response = state.accounts.login(request, Utc::now()).await?;
    let cookie = session_cookie(response.token.clone(), &state.config.frontend_url);
    Ok((jar.add(cookie), Json(response)))
}

async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        StatusCode::NO_CONTENT,
    )
}

async fn resend_verification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ResendVerificationResponse>> {
    let sent = state.accounts.resend_verification(request).await?;
    Ok(Json(ResendVerificationResponse { sent }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_flags() {
        let cookie = session_cookie("tok".to_string(), "http://localhost:8081");
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(false));

        let cookie = session_cookie("tok".to_string(), "https://school.example.com");
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }
}
