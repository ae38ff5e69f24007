//! Unified error handling for relaycore.
//!
//! A single closed error enum covers every layer: connection handshake,
//! message engine, conversation engine, retrieval engine, and the REST
//! surface. Each variant carries its own `error.code` string (stable,
//! machine-readable) and an HTTP-style status for the REST envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// The closed error enumeration from the external interface contract.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("token required")]
    TokenRequired,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid payload")]
    InvalidPayload,

    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid conversation id")]
    InvalidConversation,
    #[error("invalid uuid")]
    InvalidUuid,

    #[error("content must not be empty")]
    ContentEmpty,
    #[error("content exceeds maximum length")]
    ContentTooLong,

    #[error("not a participant of this conversation")]
    NotParticipant,
    #[error("not the owner of this message")]
    NotOwner,
    #[error("edit window expired")]
    EditWindowExpired,

    #[error("message not found")]
    MessageNotFound,
    #[error("conversation not found")]
    ConversationNotFound,
    #[error("user not found")]
    UserNotFound,

    #[error("blocked")]
    Blocked,

    #[error("at least one admin is required")]
    LastAdmin,
    #[error("at least one participant is required")]
    LastParticipant,

    #[error("cannot create a direct conversation with yourself")]
    SelfConversation,
    #[error("cannot add yourself as a contact")]
    SelfContact,

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("operation timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache error: {0}")]
    Cache(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code surfaced as `error.code`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TokenRequired => "TOKEN_REQUIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::InvalidConversation => "INVALID_CONVERSATION",
            Self::InvalidUuid => "INVALID_UUID",
            Self::ContentEmpty => "CONTENT_EMPTY",
            Self::ContentTooLong => "CONTENT_TOO_LONG",
            Self::NotParticipant => "NOT_PARTICIPANT",
            Self::NotOwner => "NOT_OWNER",
            Self::EditWindowExpired => "EDIT_WINDOW_EXPIRED",
            Self::MessageNotFound => "MESSAGE_NOT_FOUND",
            Self::ConversationNotFound => "CONVERSATION_NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::Blocked => "BLOCKED",
            Self::LastAdmin => "LAST_ADMIN",
            Self::LastParticipant => "LAST_PARTICIPANT",
            Self::SelfConversation => "SELF_CONVERSATION",
            Self::SelfContact => "SELF_CONTACT",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// HTTP-style status used both by the REST surface and as a label for
    /// realtime `message:error` severity.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TokenRequired
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::InvalidPayload => StatusCode::UNAUTHORIZED,
            Self::ValidationError(_)
            | Self::InvalidInput(_)
            | Self::InvalidConversation
            | Self::InvalidUuid
            | Self::ContentEmpty
            | Self::ContentTooLong
            | Self::LastAdmin
            | Self::LastParticipant
            | Self::SelfConversation
            | Self::SelfContact => StatusCode::BAD_REQUEST,
            Self::NotParticipant | Self::NotOwner | Self::EditWindowExpired | Self::Blocked => {
                StatusCode::FORBIDDEN
            }
            Self::MessageNotFound | Self::ConversationNotFound | Self::UserNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Database(_) | Self::Cache(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// `retryAfter` in milliseconds, present only for rate-limit rejections.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Wire-level error body, nested under `error` in the REST response envelope
/// and used verbatim as the payload of `message:error`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            retry_after: err.retry_after_ms(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = crate::handlers::rest::ApiResponse::<()>::error(ErrorBody::from(&self));
        if matches!(self, Self::Database(_) | Self::Internal(_)) {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AppError::TokenRequired.code(), "TOKEN_REQUIRED");
        assert_eq!(AppError::MessageNotFound.code(), "MESSAGE_NOT_FOUND");
        assert_eq!(
            AppError::RateLimited { retry_after_ms: 500 }.code(),
            "RATE_LIMITED"
        );
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = AppError::RateLimited { retry_after_ms: 1200 };
        assert_eq!(err.retry_after_ms(), Some(1200));
        assert_eq!(AppError::Blocked.retry_after_ms(), None);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::NotOwner.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::UserNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
