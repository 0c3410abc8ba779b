// routes/notifications.rs
// In-app notification inbox, statistics, and email template administration.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    error::{ApiError, ApiResult},
    models::NotificationType,
    session::SessionUser,
    state::{
        AppState, NotificationOverview, TemplateUpdate, UserNotificationStats,
        delete_notification, list_notifications, list_templates, mark_all_read,
        mark_notification_read, notification_overview, update_template,
        user_notification_stats,
    },
};

use super::{
    helpers::{ApiJson, parse_id, parse_opt_id},
    views::{NotificationView, TemplateView, list},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsQuery {
    pub user_id: Option<String>,
    pub limit: Option<i64>,
    pub include_read: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetUserQuery {
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpdateRequest {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub is_active: Option<bool>,
}

/// Resolves `?userId`: defaults to the caller, and only admins may name someone else.
fn target_user(session_user: &SessionUser, raw: Option<&str>) -> ApiResult<ObjectId> {
    let target = parse_opt_id(raw)?.unwrap_or(*session_user.user_id());
    if !session_user.actor().can_access(&target) {
        return Err(ApiError::Forbidden);
    }
    Ok(target)
}

pub async fn notifications_index(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Query(query): Query<NotificationsQuery>,
) -> ApiResult<Json<Vec<NotificationView>>> {
    let user_id = target_user(&session_user, query.user_id.as_deref())?;
    let unread_only = !query.include_read.unwrap_or(true);
    let items = list_notifications(&st, &user_id, unread_only, query.limit).await?;
    Ok(Json(list(items)))
}

pub async fn notifications_read(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
) -> ApiResult<Json<NotificationView>> {
    let id = parse_id(&id)?;
    let notification = mark_notification_read(&st, &session_user.actor(), &id).await?;
    Ok(Json(notification.into()))
}

pub async fn notifications_read_all(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Query(query): Query<TargetUserQuery>,
) -> ApiResult<Json<Value>> {
    let user_id = target_user(&session_user, query.user_id.as_deref())?;
    let updated = mark_all_read(&st, &user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn notifications_delete(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    delete_notification(&st, &session_user.actor(), &parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn notifications_stats(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Query(query): Query<TargetUserQuery>,
) -> ApiResult<Json<UserNotificationStats>> {
    let user_id = target_user(&session_user, query.user_id.as_deref())?;
    Ok(Json(user_notification_stats(&st, &user_id).await?))
}

pub async fn notifications_overview(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
) -> ApiResult<Json<NotificationOverview>> {
    session_user.require_admin()?;
    Ok(Json(notification_overview(&st, Utc::now()).await?))
}

pub async fn templates_index(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
) -> ApiResult<Json<Vec<TemplateView>>> {
    session_user.require_admin()?;
    Ok(Json(list(list_templates(&st).await?)))
}

pub async fn templates_update(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(kind): Path<String>,
    ApiJson(body): ApiJson<TemplateUpdateRequest>,
) -> ApiResult<Json<TemplateView>> {
    session_user.require_admin()?;
    let kind: NotificationType = kind.parse().map_err(ApiError::Validation)?;
    let update = TemplateUpdate {
        subject: body.subject,
        body: body.body,
        is_active: body.is_active,
    };
    Ok(Json(update_template(&st, kind, update).await?.into()))
}
