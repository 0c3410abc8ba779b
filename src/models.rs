// models.rs
// Domain models for MongoDB collections.

use std::{fmt, str::FromStr};

use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// User roles for authorization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    Tenant,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Tenant => "tenant",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

fn default_true() -> bool {
    true
}

/// User document. `email` is stored lower-cased and is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: UserRole,
    #[serde(default)]
    pub room_id: Option<ObjectId>,
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    #[serde(default)]
    pub created_at: Option<DateTime>,
    #[serde(default)]
    pub updated_at: Option<DateTime>,
}

/// Session document stored in MongoDB linking a token to a user and expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub token: String,
    pub user_email: String,
    pub expires_at: DateTime,
}

/// Room document. `is_occupied` implies `tenant_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub room_number: String,
    #[serde(default)]
    pub floor: Option<i32>,
    pub rent_price: f64,
    pub water_price: f64,
    pub electricity_price: f64,
    pub is_occupied: bool,
    #[serde(default)]
    pub tenant_id: Option<ObjectId>,
    #[serde(default)]
    pub move_in_date: Option<DateTime>,
    #[serde(default)]
    pub move_out_date: Option<DateTime>,
    pub due_day: i32,
    pub deposit: f64,
    #[serde(default)]
    pub created_at: Option<DateTime>,
    #[serde(default)]
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Pending,
    Paid,
    Overdue,
    Verified,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::Paid => "paid",
            BillStatus::Overdue => "overdue",
            BillStatus::Verified => "verified",
        }
    }
}

impl FromStr for BillStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BillStatus::Pending),
            "paid" => Ok(BillStatus::Paid),
            "overdue" => Ok(BillStatus::Overdue),
            "verified" => Ok(BillStatus::Verified),
            other => Err(format!("unknown bill status: {other}")),
        }
    }
}

/// One room's charges for one calendar month. Unique on (room_id, month, year).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub room_id: ObjectId,
    pub tenant_id: ObjectId,
    pub month: i32,
    pub year: i32,
    pub rent_amount: f64,
    pub water_amount: f64,
    pub electricity_amount: f64,
    #[serde(default)]
    pub water_units: f64,
    #[serde(default)]
    pub electricity_units: f64,
    pub total_amount: f64,
    pub due_date: DateTime,
    pub status: BillStatus,
    #[serde(default)]
    pub created_at: Option<DateTime>,
    #[serde(default)]
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Verified,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Verified => "verified",
            PaymentStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "verified" => Ok(PaymentStatus::Verified),
            "rejected" => Ok(PaymentStatus::Rejected),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// Where an uploaded slip image lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlipImage {
    pub url: String,
    pub size: i64,
    pub content_type: String,
}

/// Transaction fields read from a slip by OCR.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OcrData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_no: Option<String>,
}

/// Fields decoded from the verification QR printed on bank slips.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QrData {
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sending_bank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trans_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default)]
    pub crc_valid: bool,
}

/// One uploaded proof-of-payment attempt against a bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub bill_id: ObjectId,
    /// Who uploaded the slip; an admin may upload on a tenant's behalf.
    pub user_id: ObjectId,
    /// The bill's tenant, who owns the payment and receives decisions about it.
    pub tenant_id: ObjectId,
    pub slip_image: SlipImage,
    #[serde(default)]
    pub ocr_data: Option<OcrData>,
    #[serde(default)]
    pub qr_data: Option<QrData>,
    pub status: PaymentStatus,
    /// Set when a newer upload for the same bill replaced this one.
    #[serde(default)]
    pub superseded_by: Option<ObjectId>,
    #[serde(default)]
    pub verified_by: Option<ObjectId>,
    #[serde(default)]
    pub verified_at: Option<DateTime>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime>,
    #[serde(default)]
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    PaymentReminder,
    PaymentVerified,
    PaymentRejected,
    BillGenerated,
    Overdue,
}

impl NotificationType {
    pub const ALL: [NotificationType; 5] = [
        NotificationType::PaymentReminder,
        NotificationType::PaymentVerified,
        NotificationType::PaymentRejected,
        NotificationType::BillGenerated,
        NotificationType::Overdue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::PaymentReminder => "payment_reminder",
            NotificationType::PaymentVerified => "payment_verified",
            NotificationType::PaymentRejected => "payment_rejected",
            NotificationType::BillGenerated => "bill_generated",
            NotificationType::Overdue => "overdue",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown notification type: {s}"))
    }
}

/// Per-user inbox entry. Only `read`/`read_at` change after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub bill_id: Option<ObjectId>,
    pub read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime>,
    pub sent_at: DateTime,
    pub created_at: DateTime,
}

/// Email template for one notification type, with `{{variable}}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub subject: String,
    pub body: String,
    pub is_active: bool,
    pub version: i32,
    #[serde(default)]
    pub updated_at: Option<DateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_type_round_trips_through_str() {
        for kind in NotificationType::ALL {
            assert_eq!(kind.as_str().parse::<NotificationType>().unwrap(), kind);
        }
        assert!("welcome".parse::<NotificationType>().is_err());
    }

    #[test]
    fn user_defaults_opt_in_to_email() {
        let raw = serde_json::json!({
            "email": "a@b.c",
            "password_hash": "x",
            "name": "A",
            "role": "tenant"
        });
        let user: User = serde_json::from_value(raw).unwrap();
        assert!(user.email_notifications);
        assert_eq!(user.role, UserRole::Tenant);
        assert!(user.room_id.is_none());
    }
}
