use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::User;
use crate::error::{AppError, AppResult};
use crate::presence::PresenceStatus;
use crate::state::AppState;

use super::{ApiResponse, AuthUser};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me).patch(update_profile))
        .route("/me/status", put(update_status))
        .route("/me/avatar", patch(update_avatar))
        .route("/me/privacy", patch(update_privacy))
        .route("/search", get(search))
        .route("/:id", get(get_user))
}

#[derive(Serialize)]
pub struct UserProfile {
    id: String,
    username: String,
    display_name: String,
    bio: String,
    avatar_ref: Option<String>,
    status: String,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            display_name: u.display_name,
            bio: u.bio,
            avatar_ref: u.avatar_ref,
            status: u.status,
        }
    }
}

async fn me(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let user = state.db.users().find_by_id(&user_id).await?.ok_or(AppError::UserNotFound)?;
    Ok(Json(ApiResponse::ok(user.into())))
}

async fn get_user(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let user = state.db.users().find_by_id(&id).await?.ok_or(AppError::UserNotFound)?;
    Ok(Json(ApiResponse::ok(user.into())))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    display_name: String,
    bio: String,
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.db.users().update_profile(&user_id, &req.display_name, &req.bio).await?;
    Ok(Json(ApiResponse::ok(())))
}

#[derive(Deserialize)]
pub struct UpdateAvatarRequest {
    avatar_ref: String,
}

async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<UpdateAvatarRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    if req.avatar_ref.len() > state.config.limits.avatar_max_bytes {
        return Err(AppError::ValidationError("avatar reference exceeds maximum size".into()));
    }
    state.db.users().update_avatar(&user_id, &req.avatar_ref).await?;
    Ok(Json(ApiResponse::ok(())))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    status: String,
}

/// REST equivalent of the `presence:update` realtime event, for clients
/// that set an initial status before opening a WebSocket connection.
async fn update_status(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<UpdateStatusRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let status: PresenceStatus = req
        .status
        .parse()
        .map_err(|_| AppError::ValidationError("status must be one of online, away, busy".into()))?;
    state.engines.presence.set_status(&user_id, status).await?;
    Ok(Json(ApiResponse::ok(())))
}

#[derive(Deserialize)]
pub struct UpdatePrivacyRequest {
    hide_read_status: bool,
}

async fn update_privacy(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<UpdatePrivacyRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.db.users().update_privacy(&user_id, req.hide_read_status).await?;
    Ok(Json(ApiResponse::ok(())))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    #[serde(default = "default_search_limit")]
    limit: i64,
    #[serde(default, rename = "excludeContacts")]
    exclude_contacts: bool,
}
fn default_search_limit() -> i64 {
    20
}

async fn search(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<Vec<UserProfile>>>> {
    let limit = q.limit.clamp(1, 50);
    // Over-fetch so filtering out existing contacts doesn't starve the page.
    let fetch_limit = if q.exclude_contacts { limit * 2 } else { limit };
    let mut users = state.db.users().search(&q.q, fetch_limit).await?;

    if q.exclude_contacts {
        let contacts = state.db.contacts().list(&user_id).await?;
        let contact_ids: std::collections::HashSet<String> = contacts.into_iter().map(|c| c.contact_user_id).collect();
        users.retain(|u| u.id != user_id && !contact_ids.contains(&u.id));
    }
    users.truncate(limit as usize);

    Ok(Json(ApiResponse::ok(users.into_iter().map(UserProfile::from).collect())))
}
