// routes/auth.rs
// POST /auth/register, /auth/bootstrap-admin, /auth/login, /auth/logout

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    models::UserRole,
    session::{SESSION_COOKIE_NAME, SessionUser},
    state::{
        AppState, NewUser, authenticate, bootstrap_admin, create_session, create_user,
        delete_session, get_user_by_id,
    },
};

use super::{helpers::ApiJson, views::UserView};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl RegisterRequest {
    fn into_new_user(self, role: UserRole) -> ApiResult<NewUser> {
        match (self.email, self.password, self.name) {
            (Some(email), Some(password), Some(name)) => Ok(NewUser {
                email,
                password,
                name,
                phone: self.phone,
                role,
            }),
            _ => Err(ApiError::validation("กรุณากรอกอีเมล รหัสผ่าน และชื่อ")),
        }
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

async fn created_user(state: &AppState, id: ObjectId) -> ApiResult<(StatusCode, Json<UserView>)> {
    let user = get_user_by_id(state, &id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบผู้ใช้"))?;
    Ok((StatusCode::CREATED, Json(UserView::from(user))))
}

pub async fn register(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = create_user(&st, body.into_new_user(UserRole::Tenant)?).await?;
    created_user(&st, id).await
}

/// Only succeeds while no admin account exists.
pub async fn bootstrap(
    State(st): State<Arc<AppState>>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = bootstrap_admin(&st, body.into_new_user(UserRole::Admin)?).await?;
    info!(user = %id, "admin bootstrapped");
    created_user(&st, id).await
}

pub async fn login(
    State(st): State<Arc<AppState>>,
    jar: CookieJar,
    ApiJson(body): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::validation("กรุณากรอกอีเมลและรหัสผ่าน"));
    }
    let user = authenticate(&st, &body.email, &body.password)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    let token = create_session(&st, &user.email).await?;

    let cookie = Cookie::build((SESSION_COOKIE_NAME, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(st.config.production);
    let body = json!({ "token": token, "user": UserView::from(user) });
    Ok((jar.add(cookie), Json(body)))
}

pub async fn logout(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    jar: CookieJar,
) -> ApiResult<impl IntoResponse> {
    delete_session(&st, session_user.token()).await?;
    let jar = jar.remove(Cookie::build(SESSION_COOKIE_NAME).path("/"));
    Ok((jar, Json(json!({ "ok": true }))))
}
