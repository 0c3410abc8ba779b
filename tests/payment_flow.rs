#[path = "common/mod.rs"]
mod common;

use axum::http::StatusCode;
use chrono::Utc;
use mongodb::{IndexModel, bson::doc, options::IndexOptions};

use dormkeeper::{
    error::ApiError,
    models::{BillStatus, NotificationType, OcrData, PaymentStatus, UserRole},
    state::{
        AppState, BillFilter, Decision, PaymentFilter, PaymentUpload, generate_monthly_bills,
        get_bill, get_payment, list_bills, list_notifications, list_payments, upload_payment,
        verify_payment,
    },
};
use mongodb::bson::oid::ObjectId;

async fn current_bill(st: &AppState, tenant: &common::Account) -> ObjectId {
    generate_monthly_bills(st, Utc::now()).await.unwrap();
    let bills = list_bills(
        st,
        BillFilter {
            tenant_id: Some(tenant.actor.id),
            ..BillFilter::default()
        },
    )
    .await
    .unwrap();
    bills[0].id.unwrap()
}

fn upload(bill_id: ObjectId) -> PaymentUpload {
    PaymentUpload {
        bill_id: Some(bill_id),
        slip_image_base64: format!("data:image/png;base64,{}", common::png_base64()),
        ..PaymentUpload::default()
    }
}

#[tokio::test]
async fn latest_upload_wins_and_decisions_are_final() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let admin = common::account(st, "admin@example.com", UserRole::Admin).await;
    let tenant = common::account(st, "tenant@example.com", UserRole::Tenant).await;
    common::occupied_room(st, "101", &tenant).await;
    let bill_id = current_bill(st, &tenant).await;

    let first = upload_payment(st, &tenant.actor, upload(bill_id)).await.unwrap();
    let second = upload_payment(st, &tenant.actor, upload(bill_id)).await.unwrap();
    assert_eq!(get_bill(st, &bill_id).await.unwrap().unwrap().status, BillStatus::Paid);

    let first_id = first.id.unwrap();
    let second_id = second.id.unwrap();
    let stale = get_payment(st, &first_id).await.unwrap().unwrap();
    assert_eq!(stale.superseded_by, Some(second_id));
    assert!(second.slip_image.url.contains("/slips/"));

    let pending = list_payments(
        st,
        PaymentFilter {
            status: Some(PaymentStatus::Pending),
            ..PaymentFilter::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, Some(second_id));

    assert!(matches!(
        verify_payment(st, &admin.actor, &first_id, Decision::Approve).await,
        Err(ApiError::Conflict(_))
    ));

    let verified = verify_payment(st, &admin.actor, &second_id, Decision::Approve)
        .await
        .unwrap();
    assert_eq!(verified.status, PaymentStatus::Verified);
    assert_eq!(verified.verified_by, Some(admin.actor.id));
    assert!(verified.verified_at.is_some());
    assert_eq!(get_bill(st, &bill_id).await.unwrap().unwrap().status, BillStatus::Verified);

    let again = verify_payment(
        st,
        &admin.actor,
        &second_id,
        Decision::Reject {
            reason: "late".into(),
        },
    )
    .await;
    assert!(matches!(again, Err(ApiError::Conflict(_))));

    assert!(matches!(
        upload_payment(st, &tenant.actor, upload(bill_id)).await,
        Err(ApiError::Conflict(_))
    ));

    let inbox = list_notifications(st, &tenant.actor.id, false, None).await.unwrap();
    assert!(inbox.iter().any(|n| n.kind == NotificationType::PaymentVerified));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn rejection_reopens_bill_and_tells_tenant_why() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let admin = common::account(st, "admin@example.com", UserRole::Admin).await;
    let tenant = common::account(st, "tenant@example.com", UserRole::Tenant).await;
    common::occupied_room(st, "102", &tenant).await;
    let bill_id = current_bill(st, &tenant).await;

    let payment = upload_payment(st, &tenant.actor, upload(bill_id)).await.unwrap();
    let decision = Decision::from_request(false, Some("ยอดเงินไม่ตรงกับบิล".into())).unwrap();
    let rejected = verify_payment(st, &admin.actor, &payment.id.unwrap(), decision)
        .await
        .unwrap();
    assert_eq!(rejected.status, PaymentStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("ยอดเงินไม่ตรงกับบิล"));
    assert_eq!(get_bill(st, &bill_id).await.unwrap().unwrap().status, BillStatus::Pending);

    let inbox = list_notifications(st, &tenant.actor.id, false, None).await.unwrap();
    let notice = inbox
        .iter()
        .find(|n| n.kind == NotificationType::PaymentRejected)
        .expect("rejection notice");
    assert!(notice.message.contains("ยอดเงินไม่ตรงกับบิล"));
    assert_eq!(notice.bill_id, Some(bill_id));

    // a fresh upload after rejection is accepted
    upload_payment(st, &tenant.actor, upload(bill_id)).await.unwrap();

    common::teardown(ctx).await;
}

#[tokio::test]
async fn uploads_are_checked_before_anything_is_stored() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let owner = common::account(st, "owner@example.com", UserRole::Tenant).await;
    let other = common::account(st, "other@example.com", UserRole::Tenant).await;
    common::occupied_room(st, "103", &owner).await;
    let bill_id = current_bill(st, &owner).await;

    let mut bad_type = upload(bill_id);
    bad_type.slip_image_base64 = format!("data:application/pdf;base64,{}", common::png_base64());
    assert!(matches!(
        upload_payment(st, &owner.actor, bad_type).await,
        Err(ApiError::Validation(_))
    ));

    assert!(matches!(
        upload_payment(st, &owner.actor, upload(ObjectId::new())).await,
        Err(ApiError::NotFound(_))
    ));

    assert!(matches!(
        upload_payment(st, &other.actor, upload(bill_id)).await,
        Err(ApiError::Forbidden)
    ));

    assert!(list_payments(st, PaymentFilter::default()).await.unwrap().is_empty());

    common::teardown(ctx).await;
}

#[tokio::test]
async fn ocr_text_fills_gaps_in_client_fields() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let tenant = common::account(st, "ocr@example.com", UserRole::Tenant).await;
    common::occupied_room(st, "104", &tenant).await;
    let bill_id = current_bill(st, &tenant).await;

    let mut body = upload(bill_id);
    body.ocr_data = Some(OcrData {
        amount: Some(3150.0),
        ..OcrData::default()
    });
    body.ocr_text = Some("จำนวนเงิน 9,999.00 บาท\nรหัสอ้างอิง ABC123456".into());
    let payment = upload_payment(st, &tenant.actor, body).await.unwrap();
    let ocr = payment.ocr_data.unwrap();
    assert_eq!(ocr.amount, Some(3150.0));
    assert_eq!(ocr.reference.as_deref(), Some("ABC123456"));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn slip_uploaded_by_admin_belongs_to_the_tenant() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let admin = common::account(st, "admin@example.com", UserRole::Admin).await;
    let tenant = common::account(st, "tenant@example.com", UserRole::Tenant).await;
    common::occupied_room(st, "105", &tenant).await;
    let bill_id = current_bill(st, &tenant).await;

    let payment = upload_payment(st, &admin.actor, upload(bill_id)).await.unwrap();
    assert_eq!(payment.user_id, admin.actor.id);
    assert_eq!(payment.tenant_id, tenant.actor.id);
    let payment_id = payment.id.unwrap();

    let own = list_payments(
        st,
        PaymentFilter {
            tenant_id: Some(tenant.actor.id),
            ..PaymentFilter::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(own.len(), 1);

    let app = common::app(st.clone());
    let (status, body) = common::send(
        &app,
        "GET",
        &format!("/payments/{}", payment_id.to_hex()),
        Some(&tenant.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenantId"], tenant.actor.id.to_hex().as_str());
    let (_, listed) = common::send(&app, "GET", "/payments", Some(&tenant.token), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let slip_path = format!("/slips/{}", payment.slip_image.url.rsplit('/').next().unwrap());
    let (status, _) = common::send(&app, "GET", &slip_path, Some(&tenant.token), None).await;
    assert_eq!(status, StatusCode::OK);

    verify_payment(st, &admin.actor, &payment_id, Decision::Approve)
        .await
        .unwrap();

    let inbox = list_notifications(st, &tenant.actor.id, false, None).await.unwrap();
    assert!(inbox.iter().any(|n| n.kind == NotificationType::PaymentVerified));
    let admin_inbox = list_notifications(st, &admin.actor.id, false, None).await.unwrap();
    assert!(!admin_inbox.iter().any(|n| n.kind == NotificationType::PaymentVerified));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn failed_payment_insert_removes_the_stored_slip() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let tenant = common::account(st, "slip@example.com", UserRole::Tenant).await;
    common::occupied_room(st, "106", &tenant).await;
    let bill_id = current_bill(st, &tenant).await;

    // one payment per bill, so the second insert is rejected by the store
    st.payments
        .create_index(
            IndexModel::builder()
                .keys(doc! { "bill_id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await
        .unwrap();

    upload_payment(st, &tenant.actor, upload(bill_id)).await.unwrap();
    assert!(upload_payment(st, &tenant.actor, upload(bill_id)).await.is_err());

    let stored = std::fs::read_dir(&st.config.slip_storage_dir).unwrap().count();
    assert_eq!(stored, 1);

    common::teardown(ctx).await;
}
