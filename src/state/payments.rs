use anyhow::Result;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{Bson, DateTime, Document, doc, oid::ObjectId},
    options::ReturnDocument,
};
use tracing::{info, warn};

use crate::{
    error::{ApiError, ApiResult},
    models::{
        Bill, BillStatus, NotificationType, OcrData, Payment, PaymentStatus, QrData,
    },
    period::{BillingPeriod, format_thai_date},
    slip::{decode_slip_image, merge_extraction, parse_slip_qr, parse_slip_text},
};

use super::{Actor, AppState, NewNotification, deliver, format_baht, get_bill, get_room};

#[derive(Debug, Clone, Default)]
pub struct PaymentUpload {
    pub bill_id: Option<ObjectId>,
    pub slip_image_base64: String,
    /// Fields the client already extracted. They win over server-side extraction.
    pub ocr_data: Option<OcrData>,
    /// Raw OCR text; parsed on the server and used to fill gaps in `ocr_data`.
    pub ocr_text: Option<String>,
    pub qr_data: Option<QrData>,
    /// Raw QR payload read from the slip.
    pub qr_payload: Option<String>,
}

/// An admin's verdict on a pending payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

impl Decision {
    /// A rejection must carry a non-blank reason.
    pub fn from_request(approved: bool, reason: Option<String>) -> ApiResult<Self> {
        if approved {
            return Ok(Decision::Approve);
        }
        match reason.map(|r| r.trim().to_string()) {
            Some(reason) if !reason.is_empty() => Ok(Decision::Reject { reason }),
            _ => Err(ApiError::validation("กรุณาระบุเหตุผลในการปฏิเสธ")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub user_id: Option<ObjectId>,
    pub tenant_id: Option<ObjectId>,
    pub bill_id: Option<ObjectId>,
    pub status: Option<PaymentStatus>,
    pub include_superseded: bool,
}

fn qr_from_upload(upload: &PaymentUpload) -> Option<QrData> {
    if let Some(payload) = upload.qr_payload.as_deref().filter(|p| !p.trim().is_empty()) {
        match parse_slip_qr(payload) {
            Ok(parsed) => return Some(parsed),
            Err(e) => warn!(error = %e, "ignoring unreadable slip QR payload"),
        }
    }
    upload.qr_data.clone()
}

/// Stores a slip against a bill. The newest upload supersedes older pending ones and
/// moves the bill to `paid` until an admin decides.
pub async fn upload_payment(
    state: &AppState,
    actor: &Actor,
    upload: PaymentUpload,
) -> ApiResult<Payment> {
    let bill_id = upload
        .bill_id
        .ok_or_else(|| ApiError::validation("กรุณาระบุบิลที่ต้องการชำระ"))?;
    let slip = decode_slip_image(&upload.slip_image_base64)
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let bill = get_bill(state, &bill_id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบบิล"))?;
    if !actor.can_access(&bill.tenant_id) {
        return Err(ApiError::Forbidden);
    }
    if bill.status == BillStatus::Verified {
        return Err(ApiError::conflict("บิลนี้ได้รับการยืนยันการชำระแล้ว"));
    }

    let slip_image = state.storage.save(&slip).await?;
    let ocr_data = merge_extraction(
        upload.ocr_data.clone(),
        upload.ocr_text.as_deref().map(parse_slip_text),
    );
    let qr_data = qr_from_upload(&upload);

    let now = DateTime::now();
    let mut payment = Payment {
        id: None,
        bill_id,
        user_id: actor.id,
        tenant_id: bill.tenant_id,
        slip_image,
        ocr_data,
        qr_data,
        status: PaymentStatus::Pending,
        superseded_by: None,
        verified_by: None,
        verified_at: None,
        rejection_reason: None,
        created_at: Some(now),
        updated_at: Some(now),
    };
    let res = match state.payments.insert_one(&payment).await {
        Ok(res) => res,
        Err(e) => {
            if let Err(cleanup) = state.storage.remove(&payment.slip_image).await {
                warn!(error = ?cleanup, "removing orphaned slip failed");
            }
            return Err(e.into());
        }
    };
    let payment_id = res.inserted_id.as_object_id();
    payment.id = payment_id;

    state
        .payments
        .update_many(
            doc! {
                "bill_id": bill_id,
                "status": PaymentStatus::Pending.as_str(),
                "superseded_by": Bson::Null,
                "_id": { "$ne": payment_id },
            },
            doc! { "$set": { "superseded_by": payment_id, "updated_at": now } },
        )
        .await?;

    state
        .bills
        .update_one(
            doc! { "_id": bill_id, "status": { "$ne": BillStatus::Verified.as_str() } },
            doc! { "$set": { "status": BillStatus::Paid.as_str(), "updated_at": now } },
        )
        .await?;

    info!(bill = %bill_id, payment = ?payment_id, "payment slip uploaded");
    Ok(payment)
}

pub async fn get_payment(state: &AppState, id: &ObjectId) -> Result<Option<Payment>> {
    Ok(state.payments.find_one(doc! { "_id": id }).await?)
}

pub async fn list_payments(state: &AppState, filter: PaymentFilter) -> Result<Vec<Payment>> {
    let mut query = Document::new();
    if let Some(user_id) = filter.user_id {
        query.insert("user_id", user_id);
    }
    if let Some(tenant_id) = filter.tenant_id {
        query.insert("tenant_id", tenant_id);
    }
    if let Some(bill_id) = filter.bill_id {
        query.insert("bill_id", bill_id);
    }
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    if !filter.include_superseded {
        query.insert("superseded_by", Bson::Null);
    }
    let cursor = state
        .payments
        .find(query)
        .sort(doc! { "created_at": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

pub async fn latest_payment_for_bill(state: &AppState, bill_id: &ObjectId) -> Result<Option<Payment>> {
    Ok(state
        .payments
        .find_one(doc! { "bill_id": bill_id })
        .sort(doc! { "created_at": -1 })
        .await?)
}

/// Records an admin decision on a pending payment and moves its bill accordingly.
///
/// The payment flip is conditional on it still being the current pending upload, so
/// a second decision, or a decision on a superseded upload, is a conflict. If the bill
/// update then fails the payment is put back to pending.
pub async fn verify_payment(
    state: &AppState,
    admin: &Actor,
    payment_id: &ObjectId,
    decision: Decision,
) -> ApiResult<Payment> {
    if !admin.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let payment = get_payment(state, payment_id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบรายการชำระเงิน"))?;
    if payment.status != PaymentStatus::Pending {
        return Err(ApiError::conflict("รายการชำระเงินนี้ได้รับการตรวจสอบแล้ว"));
    }
    if payment.superseded_by.is_some() {
        return Err(ApiError::conflict("มีการอัปโหลดสลิปใหม่แทนรายการนี้แล้ว"));
    }
    let bill = get_bill(state, &payment.bill_id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบบิล"))?;

    let now = DateTime::now();
    let (payment_status, bill_status) = match &decision {
        Decision::Approve => (PaymentStatus::Verified, BillStatus::Verified),
        Decision::Reject { .. } => (PaymentStatus::Rejected, BillStatus::Pending),
    };
    let mut set = doc! {
        "status": payment_status.as_str(),
        "verified_by": admin.id,
        "verified_at": now,
        "updated_at": now,
    };
    if let Decision::Reject { reason } = &decision {
        set.insert("rejection_reason", reason.as_str());
    }

    let updated = state
        .payments
        .find_one_and_update(
            doc! {
                "_id": payment_id,
                "status": PaymentStatus::Pending.as_str(),
                "superseded_by": Bson::Null,
            },
            doc! { "$set": set },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| ApiError::conflict("รายการชำระเงินนี้ได้รับการตรวจสอบแล้ว"))?;

    let bill_update = state
        .bills
        .update_one(
            doc! { "_id": bill.id },
            doc! { "$set": { "status": bill_status.as_str(), "updated_at": now } },
        )
        .await;
    if let Err(e) = bill_update {
        revert_decision(state, payment_id).await;
        return Err(e.into());
    }

    info!(
        payment = %payment_id,
        bill = %payment.bill_id,
        status = payment_status.as_str(),
        "payment reviewed"
    );
    notify_decision(state, &bill, &updated, &decision).await;
    Ok(updated)
}

async fn revert_decision(state: &AppState, payment_id: &ObjectId) {
    let res = state
        .payments
        .update_one(
            doc! { "_id": payment_id },
            doc! {
                "$set": { "status": PaymentStatus::Pending.as_str(), "updated_at": DateTime::now() },
                "$unset": { "verified_by": "", "verified_at": "", "rejection_reason": "" },
            },
        )
        .await;
    if let Err(e) = res {
        warn!(payment = %payment_id, error = ?e, "reverting payment decision failed");
    }
}

/// Decisions go to the bill's tenant, whoever uploaded the slip.
async fn notify_decision(state: &AppState, bill: &Bill, payment: &Payment, decision: &Decision) {
    let room_number = match get_room(state, &bill.room_id).await {
        Ok(Some(room)) => room.room_number,
        _ => "-".to_string(),
    };
    let period = BillingPeriod {
        month: bill.month as u32,
        year: bill.year,
    }
    .thai_label();
    let amount = format_baht(bill.total_amount);

    let (kind, title, message, reason) = match decision {
        Decision::Approve => (
            NotificationType::PaymentVerified,
            "การชำระเงินได้รับการยืนยัน".to_string(),
            format!(
                "การชำระเงินค่าเช่าห้อง {room_number} เดือน {period} ยอด {amount} บาท ได้รับการยืนยันแล้ว"
            ),
            String::new(),
        ),
        Decision::Reject { reason } => (
            NotificationType::PaymentRejected,
            "การชำระเงินไม่ผ่านการตรวจสอบ".to_string(),
            format!(
                "สลิปการชำระเงินค่าเช่าห้อง {room_number} เดือน {period} ถูกปฏิเสธ เหตุผล: {reason} กรุณาอัปโหลดสลิปใหม่"
            ),
            reason.clone(),
        ),
    };
    let notice = NewNotification {
        user_id: bill.tenant_id,
        kind,
        title,
        message,
        bill_id: bill.id,
    };
    let vars = [
        ("roomNumber", room_number),
        ("period", period),
        ("amount", amount),
        ("dueDate", format_thai_date(bill.due_date.to_chrono())),
        ("reason", reason),
    ];
    if let Err(e) = deliver(state, notice, &vars).await {
        warn!(payment = ?payment.id, error = ?e, "payment decision notification failed");
    }
}
