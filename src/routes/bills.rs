// routes/bills.rs
// Bill listing, detail, deletion and on-demand monthly generation.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    models::BillStatus,
    session::SessionUser,
    state::{
        AppState, BillFilter, GenerationStats, bill_generation_stats, delete_bill,
        generate_monthly_bills, get_bill, latest_payment_for_bill, list_bills,
    },
};

use super::{
    helpers::{parse_id, parse_opt, parse_opt_id},
    views::{BillView, iso, list},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillsQuery {
    pub month: Option<String>,
    pub year: Option<String>,
    pub status: Option<String>,
    pub room_id: Option<String>,
    pub tenant_id: Option<String>,
}

pub async fn bills_index(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Query(query): Query<BillsQuery>,
) -> ApiResult<Json<Vec<BillView>>> {
    let mut filter = BillFilter {
        tenant_id: parse_opt_id(query.tenant_id.as_deref())?,
        room_id: parse_opt_id(query.room_id.as_deref())?,
        month: parse_opt(query.month.as_deref(), "month")?,
        year: parse_opt(query.year.as_deref(), "year")?,
        status: parse_opt::<BillStatus>(query.status.as_deref(), "status")?,
    };
    if !session_user.is_admin() {
        filter.tenant_id = Some(*session_user.user_id());
    }
    Ok(Json(list(list_bills(&st, filter).await?)))
}

pub async fn bills_show(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
) -> ApiResult<Json<BillView>> {
    let id = parse_id(&id)?;
    let bill = get_bill(&st, &id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบบิล"))?;
    if !session_user.actor().can_access(&bill.tenant_id) {
        return Err(ApiError::Forbidden);
    }
    let latest = latest_payment_for_bill(&st, &id).await?;
    let mut view = BillView::from(bill);
    view.latest_payment = latest.map(Into::into);
    Ok(Json(view))
}

pub async fn bills_delete(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    session_user.require_admin()?;
    delete_bill(&st, &parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn bills_generate(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
) -> ApiResult<Json<Value>> {
    session_user.require_admin()?;
    let now = Utc::now();
    let summary = generate_monthly_bills(&st, now).await?;
    info!(admin = %session_user.user().email, created = summary.created, "manual bill generation");
    Ok(Json(json!({
        "billsCreated": summary.created,
        "triggeredBy": session_user.user().email,
        "timestamp": iso(now.into()),
    })))
}

pub async fn bills_generation_stats(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
) -> ApiResult<Json<GenerationStats>> {
    session_user.require_admin()?;
    Ok(Json(bill_generation_stats(&st, Utc::now()).await?))
}
