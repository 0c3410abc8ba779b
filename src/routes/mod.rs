// routes/mod.rs
// Route handlers and the application router.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
};
use serde_json::{Value, json};

use crate::{session, slip::MAX_SLIP_BYTES, state::AppState};

/// Base64 inflates a maximum-size slip by 4/3; leave room for the rest of the body.
const MAX_BODY_BYTES: usize = MAX_SLIP_BYTES / 3 * 4 + 64 * 1024;

pub mod auth;
pub mod bills;
pub mod cron;
mod helpers;
pub mod notifications;
pub mod payments;
pub mod rooms;
pub mod users;
pub mod views;

pub use auth::*;
pub use bills::*;
pub use cron::*;
pub use notifications::*;
pub use payments::*;
pub use rooms::*;
pub use users::*;

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/users/me", get(me).put(update_me))
        .route("/users", get(users_index))
        .route(
            "/users/{id}",
            get(users_show).put(users_update).delete(users_delete),
        )
        .route("/rooms", get(rooms_index).post(rooms_create))
        .route(
            "/rooms/{id}",
            get(rooms_show).put(rooms_update).delete(rooms_delete),
        )
        .route("/rooms/{id}/assign", post(rooms_assign))
        .route("/rooms/{id}/checkout", post(rooms_checkout))
        .route("/bills", get(bills_index))
        .route(
            "/bills/generate",
            get(bills_generation_stats).post(bills_generate),
        )
        .route("/bills/{id}", get(bills_show).delete(bills_delete))
        .route("/payments", get(payments_index))
        .route("/payments/upload", post(payments_upload))
        .route("/payments/{id}", get(payments_show))
        .route("/payments/{id}/verify", put(payments_verify))
        .route("/slips/{file}", get(slip_image))
        .route("/notifications", get(notifications_index))
        .route("/notifications/read-all", put(notifications_read_all))
        .route("/notifications/stats", get(notifications_stats))
        .route("/notifications/overview", get(notifications_overview))
        .route("/notifications/{id}", delete(notifications_delete))
        .route("/notifications/{id}/read", put(notifications_read))
        .route("/notification-templates", get(templates_index))
        .route("/notification-templates/{type}", put(templates_update))
        .route("/cron/status", get(cron_status))
        .route("/cron/run", post(cron_run))
        .route("/cron/toggle", post(cron_toggle))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_session,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register))
        .route("/auth/bootstrap-admin", post(bootstrap))
        .route("/auth/login", post(login))
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
