use axum::extract::{Path, State};
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::Contact;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::{ApiResponse, AuthUser};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(add))
        .route("/exists/:user_id", get(exists))
        .route("/:id", delete(remove))
        .route("/:id/block", patch(set_blocked))
        .route("/:id/favorite", patch(set_favorite))
        .route("/:id/nickname", patch(set_nickname))
}

#[derive(Serialize)]
pub struct ContactView {
    contact_user_id: String,
    nickname: Option<String>,
    is_blocked: bool,
    is_favorite: bool,
    added_at: i64,
}

impl From<Contact> for ContactView {
    fn from(c: Contact) -> Self {
        Self {
            contact_user_id: c.contact_user_id,
            nickname: c.nickname,
            is_blocked: c.is_blocked,
            is_favorite: c.is_favorite,
            added_at: c.added_at,
        }
    }
}

async fn list(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ApiResponse<Vec<ContactView>>>> {
    let contacts = state.db.contacts().list(&user_id).await?;
    Ok(Json(ApiResponse::ok(contacts.into_iter().map(ContactView::from).collect())))
}

#[derive(Deserialize)]
pub struct AddContactRequest {
    contact_user_id: String,
}

async fn add(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<AddContactRequest>,
) -> AppResult<Json<ApiResponse<ContactView>>> {
    if req.contact_user_id == user_id {
        return Err(AppError::SelfContact);
    }
    if state.db.users().find_by_id(&req.contact_user_id).await?.is_none() {
        return Err(AppError::UserNotFound);
    }
    let contact = state.db.contacts().add(&user_id, &req.contact_user_id).await?;
    Ok(Json(ApiResponse::ok(contact.into())))
}

#[derive(Serialize)]
pub struct ContactExists {
    exists: bool,
}

async fn exists(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(contact_user_id): Path<String>,
) -> AppResult<Json<ApiResponse<ContactExists>>> {
    let found = state.db.contacts().find(&user_id, &contact_user_id).await?;
    Ok(Json(ApiResponse::ok(ContactExists { exists: found.is_some() })))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.db.contacts().remove(&user_id, &id).await?;
    Ok(Json(ApiResponse::ok(())))
}

#[derive(Deserialize)]
pub struct SetBlockedRequest {
    is_blocked: bool,
}

async fn set_blocked(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<SetBlockedRequest>,
) -> AppResult<Json<ApiResponse<ContactView>>> {
    let contact = state.db.contacts().set_blocked(&user_id, &id, req.is_blocked).await?;
    Ok(Json(ApiResponse::ok(contact.into())))
}

#[derive(Deserialize)]
pub struct SetFavoriteRequest {
    is_favorite: bool,
}

async fn set_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<SetFavoriteRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.db.contacts().set_favorite(&user_id, &id, req.is_favorite).await?;
    Ok(Json(ApiResponse::ok(())))
}

#[derive(Deserialize)]
pub struct SetNicknameRequest {
    nickname: Option<String>,
}

async fn set_nickname(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<SetNicknameRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.db.contacts().set_nickname(&user_id, &id, req.nickname.as_deref()).await?;
    Ok(Json(ApiResponse::ok(())))
}
