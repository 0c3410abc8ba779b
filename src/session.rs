// session.rs
// Session middleware to protect routes and extractor to access the caller.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use futures::future::BoxFuture;
use mongodb::bson::oid::ObjectId;

use crate::{
    error::{ApiError, ApiResult},
    state::{Actor, AppState, UserProfile, find_user_by_session},
};

pub const SESSION_COOKIE_NAME: &str = "session";

#[derive(Clone)]
pub struct SessionData {
    pub user: UserProfile,
    pub token: String,
}

/// Accepts the session cookie or an `Authorization: Bearer <token>` header.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let tokens = session_tokens(request.headers());
    if tokens.is_empty() {
        return Err(ApiError::Unauthorized.into_response());
    }

    let mut found = None;
    for token in tokens {
        match find_user_by_session(&state, &token).await {
            Ok(Some(user)) => {
                found = Some((user, token));
                break;
            }
            Ok(None) => continue,
            Err(e) => return Err(ApiError::Internal(e).into_response()),
        }
    }

    let Some((user, token)) = found else {
        return Err(ApiError::Unauthorized.into_response());
    };
    let user = UserProfile::try_from(user).map_err(|e| ApiError::Internal(e).into_response())?;
    request.extensions_mut().insert(SessionData { user, token });
    Ok(next.run(request).await)
}

pub struct SessionUser(pub SessionData);

impl SessionUser {
    pub fn user(&self) -> &UserProfile {
        &self.0.user
    }

    pub fn token(&self) -> &str {
        &self.0.token
    }

    pub fn user_id(&self) -> &ObjectId {
        &self.0.user.id
    }

    pub fn actor(&self) -> Actor {
        self.0.user.actor()
    }

    pub fn is_admin(&self) -> bool {
        self.0.user.role.is_admin()
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

#[allow(refining_impl_trait)]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> BoxFuture<'static, Result<Self, Self::Rejection>> {
        let data = parts
            .extensions
            .get::<SessionData>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized.into_response());

        Box::pin(async move { data.map(SessionUser) })
    }
}

/// Candidate tokens in priority order: bearer header first, then cookies.
fn session_tokens(headers: &HeaderMap) -> Vec<String> {
    let mut tokens: Vec<String> = headers
        .get_all(AUTHORIZATION)
        .into_iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect();
    let jar = CookieJar::from_headers(headers);
    tokens.extend(
        jar.iter()
            .filter(|cookie| cookie.name() == SESSION_COOKIE_NAME)
            .map(|cookie| cookie.value().to_string()),
    );
    tokens
}
