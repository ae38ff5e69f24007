use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::Message;
use crate::engine::{MessagePage, UnreadSummary};
use crate::error::AppResult;
use crate::state::AppState;

use super::{ApiResponse, AuthUser};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages/search", get(search))
        .route("/messages/unread", get(unread))
        .route("/messages/:id", axum::routing::put(edit).delete(delete))
}

#[derive(Serialize)]
pub struct MessageView {
    id: String,
    conversation_id: String,
    sender_id: String,
    content: String,
    reply_to_id: Option<String>,
    created_at: i64,
    updated_at: i64,
    is_deleted: bool,
    was_edited: bool,
}

impl From<Message> for MessageView {
    fn from(m: Message) -> Self {
        Self {
            is_deleted: m.is_deleted(),
            was_edited: m.was_edited(),
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            content: m.content,
            reply_to_id: m.reply_to_id,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct MessagePageView {
    messages: Vec<MessageView>,
    next_cursor: Option<String>,
    has_more: bool,
    cached: bool,
}

impl From<MessagePage> for MessagePageView {
    fn from(page: MessagePage) -> Self {
        Self {
            messages: page.messages.into_iter().map(MessageView::from).collect(),
            next_cursor: page.next_cursor,
            has_more: page.has_more,
            cached: page.cached,
        }
    }
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    conversation_id: Option<String>,
    #[serde(default = "default_search_limit")]
    limit: i64,
    cursor: Option<String>,
}
fn default_search_limit() -> i64 {
    20
}

async fn search(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<MessagePageView>>> {
    let page = state
        .engines
        .retrieval
        .search(&user_id, &q.q, q.conversation_id.as_deref(), q.limit, q.cursor.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(MessagePageView::from(page))))
}

#[derive(Serialize)]
pub struct UnreadSummaryView {
    total_unread: i64,
    by_conversation: HashMap<String, i64>,
}

impl From<UnreadSummary> for UnreadSummaryView {
    fn from(s: UnreadSummary) -> Self {
        Self { total_unread: s.total_unread, by_conversation: s.by_conversation }
    }
}

async fn unread(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ApiResponse<UnreadSummaryView>>> {
    let summary = state.engines.retrieval.unread_summary(&user_id).await?;
    Ok(Json(ApiResponse::ok(UnreadSummaryView::from(summary))))
}

#[derive(Deserialize)]
pub struct EditMessageRequest {
    content: String,
}

async fn edit(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<EditMessageRequest>,
) -> AppResult<Json<ApiResponse<MessageView>>> {
    let message = state.engines.message.edit(&user_id, &id, &req.content).await?;
    Ok(Json(ApiResponse::ok(MessageView::from(message))))
}

async fn delete(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.engines.message.delete(&user_id, &id).await?;
    Ok(Json(ApiResponse::ok(())))
}
