//! Self-contained identity issuer. Everywhere else in the system only ever
//! verifies a bearer token (see `security::auth::TokenVerifier`); minting
//! happens here and nowhere else.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::security::{hash_password, verify_password};
use crate::state::AppState;

use super::{ApiResponse, AuthUser};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
    display_name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    refresh_token: String,
}

#[derive(Deserialize)]
pub struct LogoutRequest {
    refresh_token: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    access_token: String,
    refresh_token: String,
    access_expires_at: i64,
    user_id: String,
}

fn is_username_or_email_conflict(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    if req.username.trim().is_empty() {
        return Err(AppError::ValidationError("username must not be empty".into()));
    }
    if req.password.len() < 8 {
        return Err(AppError::ValidationError("password must be at least 8 characters".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = state
        .db
        .users()
        .create(&req.username, &req.email, &password_hash, &req.display_name)
        .await
        .map_err(|err| {
            if is_username_or_email_conflict(&err) {
                AppError::ValidationError("username or email already taken".into())
            } else {
                AppError::from(err)
            }
        })?;

    issue_and_persist(&state, &user.id).await
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let invalid = || AppError::ValidationError("invalid username or password".into());

    let user = state.db.users().find_by_username(&req.username).await?.ok_or_else(invalid)?;
    if !user.is_active {
        return Err(invalid());
    }
    if !verify_password(&req.password, &user.password_hash)? {
        return Err(invalid());
    }

    issue_and_persist(&state, &user.id).await
}

async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let claims = state.tokens.verify_refresh(&req.refresh_token)?;
    let session = state
        .db
        .sessions()
        .find_active_by_refresh_token(&req.refresh_token)
        .await?
        .ok_or(AppError::InvalidToken)?;
    if session.expires_at < chrono::Utc::now().timestamp() {
        return Err(AppError::TokenExpired);
    }

    state.db.sessions().deactivate(&session.id).await?;
    issue_and_persist(&state, &claims.sub).await
}

async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.db.sessions().deactivate_by_refresh_token(&req.refresh_token).await?;
    Ok(Json(ApiResponse::ok(())))
}

#[derive(Serialize)]
pub struct SessionIdentity {
    user_id: String,
}

/// Confirms a bearer token is still valid and names the session it
/// belongs to, distinct from `GET /users/me`'s full profile lookup.
async fn me(AuthUser(user_id): AuthUser) -> AppResult<Json<ApiResponse<SessionIdentity>>> {
    Ok(Json(ApiResponse::ok(SessionIdentity { user_id })))
}

async fn issue_and_persist(state: &AppState, user_id: &str) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let pair = state.tokens.issue(user_id)?;
    let expires_at = chrono::Utc::now().timestamp() + state.config.tokens.refresh_ttl_secs;
    state.db.sessions().create(user_id, &pair.refresh_token, expires_at).await?;

    Ok(Json(ApiResponse::ok(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        access_expires_at: pair.access_expires_at,
        user_id: user_id.to_string(),
    })))
}
