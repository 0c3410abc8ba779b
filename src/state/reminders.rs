use anyhow::Result;
use chrono::{DateTime as ChronoDateTime, Duration, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, doc};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    models::{Bill, BillStatus, NotificationType},
    period::{BillingPeriod, format_thai_date, local_date, local_day_bounds, local_midnight},
};

use super::{AppState, NewNotification, deliver, format_baht, get_room};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OverdueSweep {
    pub marked_overdue: u64,
    pub notified: u64,
}

struct BillContext {
    room_number: String,
    period: String,
    amount: String,
    due: String,
}

async fn bill_context(state: &AppState, bill: &Bill) -> BillContext {
    let room_number = match get_room(state, &bill.room_id).await {
        Ok(Some(room)) => room.room_number,
        _ => "-".to_string(),
    };
    BillContext {
        room_number,
        period: BillingPeriod {
            month: bill.month as u32,
            year: bill.year,
        }
        .thai_label(),
        amount: format_baht(bill.total_amount),
        due: format_thai_date(bill.due_date.to_chrono()),
    }
}

impl BillContext {
    fn vars(&self) -> [(&'static str, String); 4] {
        [
            ("roomNumber", self.room_number.clone()),
            ("period", self.period.clone()),
            ("amount", self.amount.clone()),
            ("dueDate", self.due.clone()),
        ]
    }
}

/// Reminds tenants whose pending bill falls due exactly `days_ahead` local days after `now`.
pub async fn send_due_reminders(
    state: &AppState,
    now: ChronoDateTime<Utc>,
    days_ahead: i64,
) -> Result<u64> {
    let target = local_date(now) + Duration::days(days_ahead);
    let (start, end) = local_day_bounds(target);
    let bills: Vec<Bill> = state
        .bills
        .find(doc! {
            "status": BillStatus::Pending.as_str(),
            "due_date": {
                "$gte": DateTime::from_chrono(start),
                "$lt": DateTime::from_chrono(end),
            },
        })
        .await?
        .try_collect()
        .await?;

    let mut sent = 0;
    for bill in &bills {
        let ctx = bill_context(state, bill).await;
        let notice = NewNotification {
            user_id: bill.tenant_id,
            kind: NotificationType::PaymentReminder,
            title: "แจ้งเตือนชำระค่าเช่า".to_string(),
            message: format!(
                "บิลค่าเช่าห้อง {} เดือน {} ยอด {} บาท จะครบกำหนดชำระในอีก {days_ahead} วัน ({})",
                ctx.room_number, ctx.period, ctx.amount, ctx.due
            ),
            bill_id: bill.id,
        };
        match deliver(state, notice, &ctx.vars()).await {
            Ok(_) => sent += 1,
            Err(e) => warn!(bill = ?bill.id, error = ?e, "payment reminder failed"),
        }
    }

    info!(days_ahead, reminders = sent, "payment reminders sent");
    Ok(sent)
}

/// Flags pending bills whose due date is before today (local) as overdue, and notifies
/// the tenant of every bill still outstanding past its due date.
pub async fn sweep_overdue_bills(state: &AppState, now: ChronoDateTime<Utc>) -> Result<OverdueSweep> {
    let today = DateTime::from_chrono(local_midnight(local_date(now)));
    let stamp = DateTime::now();

    let marked = state
        .bills
        .update_many(
            doc! { "status": BillStatus::Pending.as_str(), "due_date": { "$lt": today } },
            doc! { "$set": { "status": BillStatus::Overdue.as_str(), "updated_at": stamp } },
        )
        .await?
        .modified_count;

    let overdue: Vec<Bill> = state
        .bills
        .find(doc! { "status": BillStatus::Overdue.as_str(), "due_date": { "$lt": today } })
        .await?
        .try_collect()
        .await?;

    let mut notified = 0;
    for bill in &overdue {
        let ctx = bill_context(state, bill).await;
        let notice = NewNotification {
            user_id: bill.tenant_id,
            kind: NotificationType::Overdue,
            title: "ค่าเช่าเกินกำหนดชำระ".to_string(),
            message: format!(
                "บิลค่าเช่าห้อง {} เดือน {} ยอด {} บาท เกินกำหนดชำระตั้งแต่วันที่ {} กรุณาชำระโดยเร็ว",
                ctx.room_number, ctx.period, ctx.amount, ctx.due
            ),
            bill_id: bill.id,
        };
        match deliver(state, notice, &ctx.vars()).await {
            Ok(_) => notified += 1,
            Err(e) => warn!(bill = ?bill.id, error = ?e, "overdue notice failed"),
        }
    }

    info!(marked, notified, "overdue sweep finished");
    Ok(OverdueSweep {
        marked_overdue: marked,
        notified,
    })
}
