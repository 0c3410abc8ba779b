#[path = "common/mod.rs"]
mod common;

use chrono::{Duration, TimeZone, Utc};
use futures::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};

use dormkeeper::{
    error::ApiError,
    models::{Bill, BillStatus, Notification, NotificationType, UserRole},
    period::{format_local_date, local_date, local_midnight},
    state::{
        BillFilter, checkout_tenant, cleanup_read_notifications, delete_room,
        generate_monthly_bills, list_bills, list_notifications, mark_all_read,
        send_due_reminders, sweep_overdue_bills,
    },
};

fn bill_due(room_id: ObjectId, tenant_id: ObjectId, due: chrono::DateTime<Utc>, month: i32) -> Bill {
    Bill {
        id: None,
        room_id,
        tenant_id,
        month,
        year: 2000,
        rent_amount: 3000.0,
        water_amount: 100.0,
        electricity_amount: 50.0,
        water_units: 0.0,
        electricity_units: 0.0,
        total_amount: 3150.0,
        due_date: DateTime::from_chrono(due),
        status: BillStatus::Pending,
        created_at: Some(DateTime::now()),
        updated_at: Some(DateTime::now()),
    }
}

#[tokio::test]
async fn generation_bills_occupied_rooms_once_per_month() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let tenant = common::account(st, "somchai@example.com", UserRole::Tenant).await;
    let room_id = common::occupied_room(st, "101", &tenant).await;
    common::room(st, "102").await;

    // 10:00 on 2024-03-10 in UTC+7
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 3, 0, 0).unwrap();
    let first = generate_monthly_bills(st, now).await.unwrap();
    assert_eq!((first.created, first.skipped, first.failed), (1, 0, 0));

    let again = generate_monthly_bills(st, now).await.unwrap();
    assert_eq!((again.created, again.skipped, again.failed), (0, 1, 0));

    let bills = list_bills(st, BillFilter::default()).await.unwrap();
    assert_eq!(bills.len(), 1);
    let bill = &bills[0];
    assert_eq!(bill.room_id, room_id);
    assert_eq!(bill.tenant_id, tenant.actor.id);
    assert_eq!((bill.month, bill.year), (3, 2024));
    assert_eq!(bill.total_amount, 3150.0);
    assert_eq!(
        bill.total_amount,
        bill.rent_amount + bill.water_amount + bill.electricity_amount
    );
    assert_eq!(bill.status, BillStatus::Pending);
    assert_eq!(format_local_date(bill.due_date.to_chrono()), "2024-03-25");

    let inbox = list_notifications(st, &tenant.actor.id, false, None).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationType::BillGenerated);
    assert_eq!(inbox[0].bill_id, bill.id);
    assert!(inbox[0].title.contains("มีนาคม 2567"));
    assert!(inbox[0].message.contains("3,150.00"));
    assert!(inbox[0].message.contains("25 มีนาคม 2567"));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn rooms_with_tenants_or_bills_cannot_be_deleted() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let tenant = common::account(st, "malee@example.com", UserRole::Tenant).await;
    let room_id = common::occupied_room(st, "201", &tenant).await;
    assert!(matches!(delete_room(st, &room_id).await, Err(ApiError::Conflict(_))));

    generate_monthly_bills(st, Utc::now()).await.unwrap();
    checkout_tenant(st, &room_id, DateTime::now()).await.unwrap();
    // vacant but still referenced by a bill
    assert!(matches!(delete_room(st, &room_id).await, Err(ApiError::Conflict(_))));

    let empty = common::room(st, "202").await;
    delete_room(st, &empty).await.unwrap();

    common::teardown(ctx).await;
}

#[tokio::test]
async fn checkout_frees_room_and_tenant() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let tenant = common::account(st, "udom@example.com", UserRole::Tenant).await;
    let room_id = common::occupied_room(st, "301", &tenant).await;
    let room = checkout_tenant(st, &room_id, DateTime::now()).await.unwrap();
    assert!(!room.is_occupied);
    assert!(room.tenant_id.is_none());
    assert!(room.move_out_date.is_some());

    assert!(matches!(
        checkout_tenant(st, &room_id, DateTime::now()).await,
        Err(ApiError::Conflict(_))
    ));

    // the tenant can move into another room afterwards
    common::occupied_room(st, "302", &tenant).await;

    common::teardown(ctx).await;
}

#[tokio::test]
async fn reminders_target_bills_due_in_n_days() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let tenant = common::account(st, "niran@example.com", UserRole::Tenant).await;
    let room_id = common::occupied_room(st, "401", &tenant).await;
    let now = Utc::now();
    let in_five = local_midnight(local_date(now) + Duration::days(5));
    let in_three = local_midnight(local_date(now) + Duration::days(3));
    st.bills
        .insert_many([
            bill_due(room_id, tenant.actor.id, in_five, 1),
            bill_due(room_id, tenant.actor.id, in_three, 2),
        ])
        .await
        .unwrap();

    assert_eq!(send_due_reminders(st, now, 5).await.unwrap(), 1);
    assert_eq!(send_due_reminders(st, now, 1).await.unwrap(), 0);

    let inbox = list_notifications(st, &tenant.actor.id, true, None).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationType::PaymentReminder);

    common::teardown(ctx).await;
}

#[tokio::test]
async fn overdue_sweep_flags_past_due_pending_bills() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let tenant = common::account(st, "pim@example.com", UserRole::Tenant).await;
    let room_id = common::occupied_room(st, "501", &tenant).await;
    let now = Utc::now();
    let past = local_midnight(local_date(now) - Duration::days(2));
    let today = local_midnight(local_date(now));
    let mut paid = bill_due(room_id, tenant.actor.id, past, 3);
    paid.status = BillStatus::Paid;
    st.bills
        .insert_many([
            bill_due(room_id, tenant.actor.id, past, 1),
            bill_due(room_id, tenant.actor.id, today, 2),
            paid,
        ])
        .await
        .unwrap();

    let sweep = sweep_overdue_bills(st, now).await.unwrap();
    assert_eq!(sweep.marked_overdue, 1);
    assert_eq!(sweep.notified, 1);

    let overdue = list_bills(
        st,
        BillFilter {
            status: Some(BillStatus::Overdue),
            ..BillFilter::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].month, 1);

    let inbox = list_notifications(st, &tenant.actor.id, true, None).await.unwrap();
    assert!(inbox.iter().any(|n| n.kind == NotificationType::Overdue));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn cleanup_removes_only_old_read_notifications() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let tenant = common::account(st, "kanya@example.com", UserRole::Tenant).await;
    let old = DateTime::from_chrono(Utc::now() - Duration::days(31));
    let recent = DateTime::now();
    let make = |read: bool, at: DateTime| Notification {
        id: None,
        user_id: tenant.actor.id,
        kind: NotificationType::PaymentReminder,
        title: "t".into(),
        message: "m".into(),
        bill_id: None,
        read,
        read_at: None,
        sent_at: at,
        created_at: at,
    };
    st.notifications
        .insert_many([make(true, old), make(false, old), make(true, recent)])
        .await
        .unwrap();

    assert_eq!(cleanup_read_notifications(st, Utc::now()).await.unwrap(), 1);

    let left: Vec<Notification> = st
        .notifications
        .find(doc! { "user_id": tenant.actor.id })
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(left.len(), 2);
    assert!(left.iter().any(|n| !n.read));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn mark_all_read_leaves_other_users_alone() {
    let ctx = common::setup_state().await;
    let Some(ref c) = ctx else {
        return;
    };
    let st = &c.state;

    let mine = common::account(st, "a@example.com", UserRole::Tenant).await;
    let theirs = common::account(st, "b@example.com", UserRole::Tenant).await;
    let note = |user_id: ObjectId| Notification {
        id: None,
        user_id,
        kind: NotificationType::BillGenerated,
        title: "t".into(),
        message: "m".into(),
        bill_id: None,
        read: false,
        read_at: None,
        sent_at: DateTime::now(),
        created_at: DateTime::now(),
    };
    st.notifications
        .insert_many([note(mine.actor.id), note(mine.actor.id), note(theirs.actor.id)])
        .await
        .unwrap();

    assert_eq!(mark_all_read(st, &mine.actor.id).await.unwrap(), 2);
    assert!(list_notifications(st, &mine.actor.id, true, None).await.unwrap().is_empty());
    assert_eq!(
        list_notifications(st, &theirs.actor.id, true, None).await.unwrap().len(),
        1
    );

    common::teardown(ctx).await;
}
