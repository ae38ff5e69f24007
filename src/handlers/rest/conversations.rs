use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::{Conversation, Participant};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::messages::MessagePageView;
use super::{ApiResponse, AuthUser};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/direct", post(create_direct))
        .route("/group", post(create_group))
        .route("/:id", get(get_conversation).patch(update_settings))
        .route("/:id/messages", get(list_messages))
        .route("/:id/participants", get(list_participants).post(add_participants))
        .route("/:id/participants/:user_id", delete(remove_participant))
        .route("/:id/participants/:user_id/role", patch(update_role))
}

#[derive(Serialize)]
pub struct ConversationView {
    id: String,
    kind: String,
    name: Option<String>,
    avatar_ref: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<Conversation> for ConversationView {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            kind: c.kind.to_string(),
            name: c.name,
            avatar_ref: c.avatar_ref,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}
fn default_limit() -> i64 {
    50
}

async fn list(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Vec<ConversationView>>>> {
    let conversations = state
        .db
        .conversations()
        .list_for_user(&user_id, None, q.limit.clamp(1, 100), q.offset.max(0))
        .await?;
    Ok(Json(ApiResponse::ok(conversations.into_iter().map(ConversationView::from).collect())))
}

async fn require_active_participant(state: &AppState, conversation_id: &str, user_id: &str) -> AppResult<()> {
    state
        .db
        .conversations()
        .find_participant(conversation_id, user_id)
        .await?
        .filter(|p| p.is_active())
        .ok_or(AppError::NotParticipant)?;
    Ok(())
}

async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<ConversationView>>> {
    let conversation = state.db.conversations().find_by_id(&id).await?.ok_or(AppError::ConversationNotFound)?;
    require_active_participant(&state, &id, &user_id).await?;
    Ok(Json(ApiResponse::ok(conversation.into())))
}

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default = "default_message_limit")]
    limit: i64,
    cursor: Option<String>,
    #[serde(default)]
    include_deleted: bool,
}
fn default_message_limit() -> i64 {
    50
}

async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Query(q): Query<ListMessagesQuery>,
) -> AppResult<Json<ApiResponse<MessagePageView>>> {
    state.db.conversations().find_by_id(&id).await?.ok_or(AppError::ConversationNotFound)?;
    require_active_participant(&state, &id, &user_id).await?;
    let page = state
        .engines
        .retrieval
        .list_recent(&id, q.limit, q.cursor.as_deref(), q.include_deleted)
        .await?;
    Ok(Json(ApiResponse::ok(MessagePageView::from(page))))
}

#[derive(Serialize)]
pub struct ParticipantView {
    user_id: String,
    is_admin: bool,
    joined_at: i64,
    left_at: Option<i64>,
    is_muted: bool,
    is_archived: bool,
}

impl From<Participant> for ParticipantView {
    fn from(p: Participant) -> Self {
        Self {
            user_id: p.user_id,
            is_admin: p.is_admin,
            joined_at: p.joined_at,
            left_at: p.left_at,
            is_muted: p.is_muted,
            is_archived: p.is_archived,
        }
    }
}

/// Full membership history, including members who have since left —
/// distinct from the active-only roster the engine uses internally for
/// last-admin/last-participant bookkeeping.
async fn list_participants(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<ParticipantView>>>> {
    state.db.conversations().find_by_id(&id).await?.ok_or(AppError::ConversationNotFound)?;
    require_active_participant(&state, &id, &user_id).await?;
    let participants = state.db.conversations().all_participants(&id).await?;
    Ok(Json(ApiResponse::ok(participants.into_iter().map(ParticipantView::from).collect())))
}

#[derive(Deserialize)]
pub struct CreateDirectRequest {
    user_id: String,
}

async fn create_direct(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<CreateDirectRequest>,
) -> AppResult<Json<ApiResponse<ConversationView>>> {
    if state.db.users().find_by_id(&req.user_id).await?.is_none() {
        return Err(AppError::UserNotFound);
    }
    let result = state.engines.conversation.create_direct(&user_id, &req.user_id).await?;
    Ok(Json(ApiResponse::ok(result.conversation.into())))
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    participant_ids: Vec<String>,
    name: Option<String>,
    avatar_ref: Option<String>,
}

async fn create_group(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<CreateGroupRequest>,
) -> AppResult<Json<ApiResponse<ConversationView>>> {
    let mut usernames = HashMap::new();
    for id in req.participant_ids.iter().chain(std::iter::once(&user_id)) {
        let user = state.db.users().find_by_id(id).await?.ok_or(AppError::UserNotFound)?;
        usernames.insert(user.id.clone(), user.username.clone());
    }
    let conversation = state
        .engines
        .conversation
        .create_group(&user_id, &req.participant_ids, req.name.as_deref(), req.avatar_ref.as_deref(), &usernames)
        .await?;
    Ok(Json(ApiResponse::ok(conversation.into())))
}

#[derive(Deserialize)]
pub struct AddParticipantsRequest {
    user_ids: Vec<String>,
}

async fn add_participants(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<AddParticipantsRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.engines.conversation.add_participants(&id, &user_id, &req.user_ids).await?;
    Ok(Json(ApiResponse::ok(())))
}

async fn remove_participant(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((id, target_id)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.engines.conversation.remove_participant(&id, &user_id, &target_id).await?;
    Ok(Json(ApiResponse::ok(())))
}

#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    name: Option<String>,
    avatar_ref: Option<String>,
}

async fn update_settings(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateSettingsRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state
        .engines
        .conversation
        .update_group_settings(&id, &user_id, req.name.as_deref(), req.avatar_ref.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(())))
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    is_admin: bool,
}

async fn update_role(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((id, target_id)): Path<(String, String)>,
    Json(req): Json<UpdateRoleRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.engines.conversation.update_role(&id, &user_id, &target_id, req.is_admin).await?;
    Ok(Json(ApiResponse::ok(())))
}
