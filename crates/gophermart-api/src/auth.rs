use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rand_core::OsRng;
use tracing::{info, warn};
use uuid::Uuid;

use gophermart_auth::TokenCodec;
use gophermart_db::Database;
use gophermart_types::api::{LoginRequest, RegisterRequest, TokenResponse};

use crate::internal;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub tokens: TokenCodec,
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, StatusCode> {
    let Json(req) = body.map_err(|_| StatusCode::BAD_REQUEST)?;

    if req.login.trim().is_empty() || req.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user_id = Uuid::new_v4();
    let issued = state.tokens.issue(user_id);

    // Hashing and the insert both block; keep them off the async runtime.
    let db = state.db.clone();
    let token = issued.token.clone();
    let login = req.login.clone();
    let created = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(internal("password hashing failed"))?
            .to_string();

        db.create_user(
            &user_id.to_string(),
            &req.login,
            &password_hash,
            &token,
            issued.expires_at,
        )
        .map_err(internal("create user failed"))
    })
    .await
    .map_err(internal("spawn_blocking join error"))??;

    if !created {
        return Err(StatusCode::CONFLICT);
    }

    info!(user = %user_id, login = %login, "user registered");
    Ok(token_reply(
        issued.token,
        issued.expires_at,
        state.tokens.lifetime(),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, StatusCode> {
    let Json(req) = body.map_err(|_| StatusCode::BAD_REQUEST)?;

    let db = state.db.clone();
    let lifetime = state.tokens.lifetime();
    let (token, expires_at) = tokio::task::spawn_blocking(move || {
        let user = db
            .get_user_by_username(&req.login)
            .map_err(internal("user lookup failed"))?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let parsed_hash =
            PasswordHash::new(&user.password).map_err(internal("stored password hash is invalid"))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| {
                warn!(login = %req.login, "login with wrong password");
                StatusCode::UNAUTHORIZED
            })?;

        // The signature does not cover the expiry, so the stored token stays
        // valid; only its advertised expiry is pushed forward.
        let mut expires_at = user.token_expires_at;
        if expires_at <= Utc::now() {
            expires_at = Utc::now() + lifetime;
            db.refresh_token_expiry(&user.id, expires_at)
                .map_err(internal("token expiry refresh failed"))?;
        }

        Ok::<_, StatusCode>((user.token, expires_at))
    })
    .await
    .map_err(internal("spawn_blocking join error"))??;

    Ok(token_reply(token, expires_at, lifetime))
}

fn token_reply(
    token: String,
    expires_at: DateTime<Utc>,
    lifetime: chrono::Duration,
) -> impl IntoResponse {
    let bearer = format!("Bearer {}", token);
    (
        StatusCode::OK,
        [(header::AUTHORIZATION, bearer)],
        Json(TokenResponse {
            token_type: "Bearer".to_string(),
            auth_token: token,
            generated_at: expires_at - lifetime,
            expires_at,
        }),
    )
}
