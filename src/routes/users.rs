// routes/users.rs
// GET/PUT /users/me, admin user management under /users.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    models::UserRole,
    session::SessionUser,
    state::{AppState, UserUpdate, delete_user, get_user_by_id, list_users, update_user},
};

use super::{
    helpers::{ApiJson, parse_id},
    views::{UserView, list},
};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email_notifications: Option<bool>,
    pub password: Option<String>,
    pub role: Option<UserRole>,
}

impl From<UserUpdateRequest> for UserUpdate {
    fn from(body: UserUpdateRequest) -> Self {
        UserUpdate {
            name: body.name,
            phone: body.phone,
            email_notifications: body.email_notifications,
            password: body.password,
            role: body.role,
        }
    }
}

#[derive(Deserialize)]
pub struct UsersQuery {
    pub role: Option<UserRole>,
}

pub async fn me(State(st): State<Arc<AppState>>, session_user: SessionUser) -> ApiResult<Json<UserView>> {
    let user = get_user_by_id(&st, session_user.user_id())
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(user.into()))
}

pub async fn update_me(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    ApiJson(body): ApiJson<UserUpdateRequest>,
) -> ApiResult<Json<UserView>> {
    let actor = session_user.actor();
    let user = update_user(&st, &actor, &actor.id, body.into()).await?;
    Ok(Json(user.into()))
}

pub async fn users_index(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Query(query): Query<UsersQuery>,
) -> ApiResult<Json<Vec<UserView>>> {
    session_user.require_admin()?;
    Ok(Json(list(list_users(&st, query.role).await?)))
}

pub async fn users_show(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
) -> ApiResult<Json<UserView>> {
    let id = parse_id(&id)?;
    if !session_user.actor().can_access(&id) {
        return Err(ApiError::Forbidden);
    }
    let user = get_user_by_id(&st, &id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบผู้ใช้"))?;
    Ok(Json(user.into()))
}

pub async fn users_update(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UserUpdateRequest>,
) -> ApiResult<Json<UserView>> {
    let id = parse_id(&id)?;
    let user = update_user(&st, &session_user.actor(), &id, body.into()).await?;
    Ok(Json(user.into()))
}

pub async fn users_delete(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    session_user.require_admin()?;
    let id = parse_id(&id)?;
    if &id == session_user.user_id() {
        return Err(ApiError::conflict("ไม่สามารถลบบัญชีของตนเองได้"));
    }
    delete_user(&st, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
