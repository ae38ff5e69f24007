//! REST surface: auth, users, contacts, conversations, messages, health.
//!
//! Every handler shares one envelope type (`ApiResponse<T>`) for both
//! success and error bodies, the same single reply-framing convention the
//! teacher's protocol layer uses for its own command replies.

mod auth;
mod contacts;
mod conversations;
mod health;
mod messages;
mod users;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, ErrorBody};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    pub fn error(error: ErrorBody) -> Self {
        Self { success: false, data: None, error: Some(error) }
    }
}

/// Extracts and verifies the bearer access token from `Authorization`,
/// giving handlers the caller's user id.
pub struct AuthUser(pub String);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::TokenRequired)?;
        let token = header.strip_prefix("Bearer ").ok_or(AppError::TokenRequired)?;
        let claims = state.tokens.verify_access(token)?;
        Ok(AuthUser(claims.sub))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/contacts", contacts::router())
        .nest("/conversations", conversations::router())
        .merge(messages::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
