use anyhow::{Context, Result};
use chrono::{DateTime as ChronoDateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::{ApiError, ApiResult, is_duplicate_key},
    models::{Bill, BillStatus, NotificationType, Room},
    period::{BillingPeriod, format_thai_date},
};

use super::{AppState, NewNotification, deliver, format_baht, user_profile};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct GenerationSummary {
    pub created: u32,
    pub skipped: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStats {
    pub month: u32,
    pub year: i32,
    pub bills_generated: u64,
    pub total_rooms: u64,
    pub occupied_rooms: u64,
    pub pending_bills: u64,
    pub paid_bills: u64,
    /// Generated bills per occupied room, 0.0 when nothing is occupied.
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BillFilter {
    pub tenant_id: Option<ObjectId>,
    pub room_id: Option<ObjectId>,
    pub month: Option<i32>,
    pub year: Option<i32>,
    pub status: Option<BillStatus>,
}

enum RoomOutcome {
    Created,
    Skipped,
}

/// Issues this month's bill for every occupied room. Re-running the same month only skips.
pub async fn generate_monthly_bills(
    state: &AppState,
    now: ChronoDateTime<Utc>,
) -> Result<GenerationSummary> {
    let period = BillingPeriod::containing(now);
    let due_date = BillingPeriod::due_date(now);
    let rooms: Vec<Room> = state
        .rooms
        .find(doc! { "is_occupied": true })
        .await?
        .try_collect()
        .await?;

    let mut summary = GenerationSummary::default();
    for room in &rooms {
        match bill_room(state, room, period, due_date).await {
            Ok(RoomOutcome::Created) => summary.created += 1,
            Ok(RoomOutcome::Skipped) => summary.skipped += 1,
            Err(e) => {
                warn!(room = %room.room_number, error = ?e, "bill generation failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        month = period.month,
        year = period.year,
        created = summary.created,
        skipped = summary.skipped,
        failed = summary.failed,
        "monthly bill generation finished"
    );
    Ok(summary)
}

async fn bill_room(
    state: &AppState,
    room: &Room,
    period: BillingPeriod,
    due_date: ChronoDateTime<Utc>,
) -> Result<RoomOutcome> {
    let room_id = room.id.context("room without _id")?;
    let tenant_id = room.tenant_id.context("occupied room has no tenant")?;
    let tenant = user_profile(state, &tenant_id)
        .await?
        .with_context(|| format!("tenant {tenant_id} not found"))?;

    let now = DateTime::now();
    let total = room.rent_price + room.water_price + room.electricity_price;
    let bill = Bill {
        id: None,
        room_id,
        tenant_id,
        month: period.month as i32,
        year: period.year,
        rent_amount: room.rent_price,
        water_amount: room.water_price,
        electricity_amount: room.electricity_price,
        water_units: 0.0,
        electricity_units: 0.0,
        total_amount: total,
        due_date: DateTime::from_chrono(due_date),
        status: BillStatus::Pending,
        created_at: Some(now),
        updated_at: Some(now),
    };
    let bill_id = match state.bills.insert_one(&bill).await {
        Ok(res) => res.inserted_id.as_object_id(),
        Err(e) if is_duplicate_key(&e) => return Ok(RoomOutcome::Skipped),
        Err(e) => return Err(e.into()),
    };

    let label = period.thai_label();
    let amount = format_baht(total);
    let due = format_thai_date(due_date);
    let notice = NewNotification {
        user_id: tenant.id,
        kind: NotificationType::BillGenerated,
        title: format!("บิลค่าเช่าประจำเดือน {label}"),
        message: format!(
            "ห้อง {} ยอดชำระ {amount} บาท กรุณาชำระภายในวันที่ {due}",
            room.room_number
        ),
        bill_id,
    };
    let vars = [
        ("roomNumber", room.room_number.clone()),
        ("period", label),
        ("amount", amount),
        ("dueDate", due),
    ];
    if let Err(e) = deliver(state, notice, &vars).await {
        warn!(room = %room.room_number, error = ?e, "bill notification failed");
    }
    Ok(RoomOutcome::Created)
}

pub async fn bill_generation_stats(
    state: &AppState,
    now: ChronoDateTime<Utc>,
) -> Result<GenerationStats> {
    let period = BillingPeriod::containing(now);
    let in_period = doc! { "month": period.month as i32, "year": period.year };

    let bills_generated = state.bills.count_documents(in_period.clone()).await?;
    let total_rooms = state.rooms.count_documents(doc! {}).await?;
    let occupied_rooms = state
        .rooms
        .count_documents(doc! { "is_occupied": true })
        .await?;
    let mut pending = in_period.clone();
    pending.insert("status", BillStatus::Pending.as_str());
    let pending_bills = state.bills.count_documents(pending).await?;
    let mut paid = in_period;
    paid.insert("status", BillStatus::Paid.as_str());
    let paid_bills = state.bills.count_documents(paid).await?;

    let completion_rate = if occupied_rooms == 0 {
        0.0
    } else {
        bills_generated as f64 / occupied_rooms as f64
    };

    Ok(GenerationStats {
        month: period.month,
        year: period.year,
        bills_generated,
        total_rooms,
        occupied_rooms,
        pending_bills,
        paid_bills,
        completion_rate,
    })
}

pub async fn list_bills(state: &AppState, filter: BillFilter) -> Result<Vec<Bill>> {
    let mut query = doc! {};
    if let Some(tenant_id) = filter.tenant_id {
        query.insert("tenant_id", tenant_id);
    }
    if let Some(room_id) = filter.room_id {
        query.insert("room_id", room_id);
    }
    if let Some(month) = filter.month {
        query.insert("month", month);
    }
    if let Some(year) = filter.year {
        query.insert("year", year);
    }
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    let cursor = state
        .bills
        .find(query)
        .sort(doc! { "year": -1, "month": -1, "created_at": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

pub async fn get_bill(state: &AppState, id: &ObjectId) -> Result<Option<Bill>> {
    Ok(state.bills.find_one(doc! { "_id": id }).await?)
}

/// Removes a bill together with every payment uploaded against it.
pub async fn delete_bill(state: &AppState, id: &ObjectId) -> ApiResult<()> {
    let res = state.bills.delete_one(doc! { "_id": id }).await?;
    if res.deleted_count == 0 {
        return Err(ApiError::NotFound("ไม่พบบิล"));
    }
    let removed = state
        .payments
        .delete_many(doc! { "bill_id": id })
        .await?
        .deleted_count;
    info!(bill = %id, payments = removed, "bill deleted");
    Ok(())
}
