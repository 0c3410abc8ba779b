use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime as ChronoDateTime, Duration, Utc};
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{Bson, DateTime, Document, doc, oid::ObjectId},
    options::ReturnDocument,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::{ApiError, ApiResult},
    models::{Notification, NotificationType},
    period::{local_date, local_midnight},
};

use super::{Actor, AppState, active_template, render_template, user_profile};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;
pub const READ_RETENTION_DAYS: i64 = 30;
const TOP_UNREAD_USERS: i64 = 10;

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: ObjectId,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub bill_id: Option<ObjectId>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct UserNotificationStats {
    pub total: u64,
    pub unread: u64,
    pub read: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadLeader {
    pub user_id: String,
    pub name: Option<String>,
    pub unread: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOverview {
    pub total: u64,
    pub unread: u64,
    pub by_type: BTreeMap<String, i64>,
    pub last_7_days: Vec<DailyCount>,
    pub last_30_days: Vec<DailyCount>,
    pub top_unread_users: Vec<UnreadLeader>,
}

/// "3,150.00"
pub fn format_baht(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (int_part, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}

pub async fn create_notification(state: &AppState, new: NewNotification) -> Result<Notification> {
    let now = DateTime::now();
    let mut notification = Notification {
        id: None,
        user_id: new.user_id,
        kind: new.kind,
        title: new.title,
        message: new.message,
        bill_id: new.bill_id,
        read: false,
        read_at: None,
        sent_at: now,
        created_at: now,
    };
    let res = state.notifications.insert_one(&notification).await?;
    notification.id = res.inserted_id.as_object_id();
    Ok(notification)
}

/// Stores the in-app notification, then emails the user when they opted in and the
/// type's template is active. Email failures are logged and never surface.
pub async fn deliver(
    state: &AppState,
    new: NewNotification,
    vars: &[(&str, String)],
) -> Result<Notification> {
    let notification = create_notification(state, new).await?;
    if state.mailer.is_enabled() {
        if let Err(e) = send_email(state, &notification, vars).await {
            warn!(
                user = %notification.user_id,
                kind = %notification.kind,
                error = ?e,
                "notification email failed"
            );
        }
    }
    Ok(notification)
}

async fn send_email(
    state: &AppState,
    notification: &Notification,
    vars: &[(&str, String)],
) -> Result<()> {
    let Some(profile) = user_profile(state, &notification.user_id).await? else {
        return Ok(());
    };
    if !profile.email_notifications {
        debug!(user = %profile.email, "email notifications turned off");
        return Ok(());
    }
    let Some(template) = active_template(state, notification.kind).await? else {
        return Ok(());
    };

    let mut all_vars: Vec<(&str, String)> = vars.to_vec();
    all_vars.push(("tenantName", profile.name.clone()));
    all_vars.push(("title", notification.title.clone()));
    all_vars.push(("message", notification.message.clone()));

    let subject = render_template(&template.subject, &all_vars);
    let body = render_template(&template.body, &all_vars);
    state.mailer.send(&profile.email, &subject, &body).await
}

pub async fn list_notifications(
    state: &AppState,
    user_id: &ObjectId,
    unread_only: bool,
    limit: Option<i64>,
) -> Result<Vec<Notification>> {
    let mut filter = doc! { "user_id": user_id };
    if unread_only {
        filter.insert("read", false);
    }
    let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let cursor = state
        .notifications
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .limit(limit)
        .await?;
    Ok(cursor.try_collect().await?)
}

async fn owned_notification(
    state: &AppState,
    actor: &Actor,
    id: &ObjectId,
) -> ApiResult<Notification> {
    let notification = state
        .notifications
        .find_one(doc! { "_id": id })
        .await?
        .ok_or(ApiError::NotFound("ไม่พบการแจ้งเตือน"))?;
    if !actor.can_access(&notification.user_id) {
        return Err(ApiError::Forbidden);
    }
    Ok(notification)
}

pub async fn mark_notification_read(
    state: &AppState,
    actor: &Actor,
    id: &ObjectId,
) -> ApiResult<Notification> {
    let notification = owned_notification(state, actor, id).await?;
    if notification.read {
        return Ok(notification);
    }
    let updated = state
        .notifications
        .find_one_and_update(
            doc! { "_id": id },
            doc! { "$set": { "read": true, "read_at": DateTime::now() } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบการแจ้งเตือน"))?;
    Ok(updated)
}

pub async fn mark_all_read(state: &AppState, user_id: &ObjectId) -> Result<u64> {
    let res = state
        .notifications
        .update_many(
            doc! { "user_id": user_id, "read": false },
            doc! { "$set": { "read": true, "read_at": DateTime::now() } },
        )
        .await?;
    Ok(res.modified_count)
}

pub async fn delete_notification(state: &AppState, actor: &Actor, id: &ObjectId) -> ApiResult<()> {
    owned_notification(state, actor, id).await?;
    state.notifications.delete_one(doc! { "_id": id }).await?;
    Ok(())
}

/// Deletes read notifications created more than 30 days before `now`. Unread ones are kept.
pub async fn cleanup_read_notifications(state: &AppState, now: ChronoDateTime<Utc>) -> Result<u64> {
    let cutoff = DateTime::from_chrono(now - Duration::days(READ_RETENTION_DAYS));
    let res = state
        .notifications
        .delete_many(doc! { "read": true, "created_at": { "$lt": cutoff } })
        .await?;
    Ok(res.deleted_count)
}

pub async fn user_notification_stats(
    state: &AppState,
    user_id: &ObjectId,
) -> Result<UserNotificationStats> {
    let total = state
        .notifications
        .count_documents(doc! { "user_id": user_id })
        .await?;
    let unread = state
        .notifications
        .count_documents(doc! { "user_id": user_id, "read": false })
        .await?;
    Ok(UserNotificationStats {
        total,
        unread,
        read: total.saturating_sub(unread),
    })
}

fn count_field(doc: &Document, key: &str) -> i64 {
    match doc.get(key) {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) => *n as i64,
        _ => 0,
    }
}

async fn daily_counts(
    state: &AppState,
    now: ChronoDateTime<Utc>,
    days: i64,
) -> Result<Vec<DailyCount>> {
    let since = local_midnight(local_date(now) - Duration::days(days - 1));
    let pipeline = vec![
        doc! { "$match": { "created_at": { "$gte": DateTime::from_chrono(since) } } },
        doc! { "$group": {
            "_id": { "$dateToString": {
                "format": "%Y-%m-%d",
                "date": "$created_at",
                "timezone": "+07:00",
            }},
            "count": { "$sum": 1 },
        }},
        doc! { "$sort": { "_id": 1 } },
    ];
    let rows: Vec<Document> = state
        .notifications
        .aggregate(pipeline)
        .await?
        .try_collect()
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            Some(DailyCount {
                date: row.get_str("_id").ok()?.to_string(),
                count: count_field(row, "count"),
            })
        })
        .collect())
}

/// Admin dashboard figures across all users.
pub async fn notification_overview(
    state: &AppState,
    now: ChronoDateTime<Utc>,
) -> Result<NotificationOverview> {
    let total = state.notifications.count_documents(doc! {}).await?;
    let unread = state
        .notifications
        .count_documents(doc! { "read": false })
        .await?;

    let by_type_rows: Vec<Document> = state
        .notifications
        .aggregate(vec![doc! { "$group": { "_id": "$type", "count": { "$sum": 1 } } }])
        .await?
        .try_collect()
        .await?;
    let by_type = by_type_rows
        .iter()
        .filter_map(|row| Some((row.get_str("_id").ok()?.to_string(), count_field(row, "count"))))
        .collect();

    let top_rows: Vec<Document> = state
        .notifications
        .aggregate(vec![
            doc! { "$match": { "read": false } },
            doc! { "$group": { "_id": "$user_id", "unread": { "$sum": 1 } } },
            doc! { "$sort": { "unread": -1 } },
            doc! { "$limit": TOP_UNREAD_USERS },
        ])
        .await?
        .try_collect()
        .await?;
    let mut top_unread_users = Vec::with_capacity(top_rows.len());
    for row in &top_rows {
        let user_id = row
            .get_object_id("_id")
            .context("unread aggregate row without user id")?;
        let name = user_profile(state, &user_id).await?.map(|p| p.name);
        top_unread_users.push(UnreadLeader {
            user_id: user_id.to_hex(),
            name,
            unread: count_field(row, "unread"),
        });
    }

    Ok(NotificationOverview {
        total,
        unread,
        by_type,
        last_7_days: daily_counts(state, now, 7).await?,
        last_30_days: daily_counts(state, now, 30).await?,
        top_unread_users,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_baht_with_grouping() {
        assert_eq!(format_baht(3150.0), "3,150.00");
        assert_eq!(format_baht(0.5), "0.50");
        assert_eq!(format_baht(1234567.891), "1,234,567.89");
        assert_eq!(format_baht(999.0), "999.00");
        assert_eq!(format_baht(-1500.0), "-1,500.00");
    }

    #[test]
    fn count_field_accepts_any_numeric_width() {
        let row = doc! { "a": 3_i32, "b": 4_i64, "c": 5.0 };
        assert_eq!(count_field(&row, "a"), 3);
        assert_eq!(count_field(&row, "b"), 4);
        assert_eq!(count_field(&row, "c"), 5);
        assert_eq!(count_field(&row, "missing"), 0);
    }
}
