// routes/payments.rs
// Slip upload, payment listing, admin verification and slip image serving.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    models::{OcrData, PaymentStatus, QrData},
    session::SessionUser,
    state::{
        AppState, Decision, PaymentFilter, PaymentUpload, get_payment, list_payments,
        upload_payment, verify_payment,
    },
};

use super::{
    helpers::{ApiJson, parse_id, parse_opt, parse_opt_id},
    views::{PaymentView, list},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub bill_id: Option<String>,
    pub slip_image_base64: Option<String>,
    pub ocr_data: Option<OcrData>,
    pub ocr_text: Option<String>,
    pub qr_data: Option<QrData>,
    pub qr_payload: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub approved: Option<bool>,
    pub rejection_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentsQuery {
    pub status: Option<String>,
    pub bill_id: Option<String>,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub include_superseded: bool,
}

pub async fn payments_upload(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    ApiJson(body): ApiJson<UploadRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(bill_id), Some(slip)) = (body.bill_id.as_deref(), body.slip_image_base64) else {
        return Err(ApiError::validation("กรุณาระบุบิลและรูปสลิป"));
    };
    let upload = PaymentUpload {
        bill_id: Some(parse_id(bill_id)?),
        slip_image_base64: slip,
        ocr_data: body.ocr_data,
        ocr_text: body.ocr_text,
        qr_data: body.qr_data,
        qr_payload: body.qr_payload,
    };
    let payment = upload_payment(&st, &session_user.actor(), upload).await?;
    Ok((StatusCode::CREATED, Json(PaymentView::from(payment))))
}

pub async fn payments_index(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Query(query): Query<PaymentsQuery>,
) -> ApiResult<Json<Vec<PaymentView>>> {
    let mut filter = PaymentFilter {
        user_id: parse_opt_id(query.user_id.as_deref())?,
        tenant_id: parse_opt_id(query.tenant_id.as_deref())?,
        bill_id: parse_opt_id(query.bill_id.as_deref())?,
        status: parse_opt::<PaymentStatus>(query.status.as_deref(), "status")?,
        include_superseded: query.include_superseded,
    };
    if !session_user.is_admin() {
        filter.user_id = None;
        filter.tenant_id = Some(*session_user.user_id());
    }
    Ok(Json(list(list_payments(&st, filter).await?)))
}

pub async fn payments_show(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
) -> ApiResult<Json<PaymentView>> {
    let payment = get_payment(&st, &parse_id(&id)?)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบรายการชำระเงิน"))?;
    if !session_user.actor().can_access(&payment.tenant_id) {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(payment.into()))
}

pub async fn payments_verify(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<VerifyRequest>,
) -> ApiResult<Json<PaymentView>> {
    session_user.require_admin()?;
    let approved = body
        .approved
        .ok_or_else(|| ApiError::validation("กรุณาระบุผลการตรวจสอบ"))?;
    let decision = Decision::from_request(approved, body.rejection_reason)?;
    let payment_id = parse_id(&id)?;
    let payment = verify_payment(&st, &session_user.actor(), &payment_id, decision).await?;
    Ok(Json(payment.into()))
}

/// Serves a stored slip image to the paying tenant or an admin.
pub async fn slip_image(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(file): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !session_user.is_admin() {
        let suffix = format!("/slips/{file}");
        let owned = list_payments(
            &st,
            PaymentFilter {
                tenant_id: Some(*session_user.user_id()),
                include_superseded: true,
                ..PaymentFilter::default()
            },
        )
        .await?
        .into_iter()
        .any(|p| p.slip_image.url.ends_with(&suffix));
        if !owned {
            return Err(ApiError::NotFound("ไม่พบไฟล์สลิป"));
        }
    }
    let slip = st
        .storage
        .load(&file)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบไฟล์สลิป"))?;
    Ok(([(CONTENT_TYPE, slip.content_type)], slip.bytes))
}
