// routes/views.rs
// JSON shapes returned by the API. Ids render as hex strings and instants as
// RFC 3339 in UTC+7.

use chrono::SecondsFormat;
use mongodb::bson::{DateTime, oid::ObjectId};
use serde::Serialize;

use crate::{
    models::{
        Bill, Notification, NotificationTemplate, OcrData, Payment, QrData, Room, SlipImage, User,
    },
    period::to_local,
};

pub fn iso(dt: DateTime) -> String {
    to_local(dt.to_chrono()).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn hex(id: Option<ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_default()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: &'static str,
    pub room_id: Option<String>,
    pub email_notifications: bool,
    pub created_at: Option<String>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        UserView {
            id: hex(user.id),
            email: user.email,
            name: user.name,
            phone: user.phone,
            role: user.role.as_str(),
            room_id: user.room_id.map(|id| id.to_hex()),
            email_notifications: user.email_notifications,
            created_at: user.created_at.map(iso),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: String,
    pub room_number: String,
    pub floor: Option<i32>,
    pub rent_price: f64,
    pub water_price: f64,
    pub electricity_price: f64,
    pub is_occupied: bool,
    pub tenant_id: Option<String>,
    pub move_in_date: Option<String>,
    pub move_out_date: Option<String>,
    pub due_day: i32,
    pub deposit: f64,
}

impl From<Room> for RoomView {
    fn from(room: Room) -> Self {
        RoomView {
            id: hex(room.id),
            room_number: room.room_number,
            floor: room.floor,
            rent_price: room.rent_price,
            water_price: room.water_price,
            electricity_price: room.electricity_price,
            is_occupied: room.is_occupied,
            tenant_id: room.tenant_id.map(|id| id.to_hex()),
            move_in_date: room.move_in_date.map(iso),
            move_out_date: room.move_out_date.map(iso),
            due_day: room.due_day,
            deposit: room.deposit,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillView {
    pub id: String,
    pub room_id: String,
    pub tenant_id: String,
    pub month: i32,
    pub year: i32,
    pub rent_amount: f64,
    pub water_amount: f64,
    pub electricity_amount: f64,
    pub water_units: f64,
    pub electricity_units: f64,
    pub total_amount: f64,
    pub due_date: String,
    pub status: &'static str,
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_payment: Option<PaymentView>,
}

impl From<Bill> for BillView {
    fn from(bill: Bill) -> Self {
        BillView {
            id: hex(bill.id),
            room_id: bill.room_id.to_hex(),
            tenant_id: bill.tenant_id.to_hex(),
            month: bill.month,
            year: bill.year,
            rent_amount: bill.rent_amount,
            water_amount: bill.water_amount,
            electricity_amount: bill.electricity_amount,
            water_units: bill.water_units,
            electricity_units: bill.electricity_units,
            total_amount: bill.total_amount,
            due_date: iso(bill.due_date),
            status: bill.status.as_str(),
            created_at: bill.created_at.map(iso),
            latest_payment: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlipImageView {
    pub url: String,
    pub size: i64,
    pub content_type: String,
}

impl From<SlipImage> for SlipImageView {
    fn from(slip: SlipImage) -> Self {
        SlipImageView {
            url: slip.url,
            size: slip.size,
            content_type: slip.content_type,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: String,
    pub bill_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub slip_image: SlipImageView,
    pub ocr_data: Option<OcrData>,
    pub qr_data: Option<QrData>,
    pub status: &'static str,
    pub superseded_by: Option<String>,
    pub verified_by: Option<String>,
    pub verified_at: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: Option<String>,
}

impl From<Payment> for PaymentView {
    fn from(payment: Payment) -> Self {
        PaymentView {
            id: hex(payment.id),
            bill_id: payment.bill_id.to_hex(),
            user_id: payment.user_id.to_hex(),
            tenant_id: payment.tenant_id.to_hex(),
            slip_image: payment.slip_image.into(),
            ocr_data: payment.ocr_data,
            qr_data: payment.qr_data,
            status: payment.status.as_str(),
            superseded_by: payment.superseded_by.map(|id| id.to_hex()),
            verified_by: payment.verified_by.map(|id| id.to_hex()),
            verified_at: payment.verified_at.map(iso),
            rejection_reason: payment.rejection_reason,
            created_at: payment.created_at.map(iso),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub message: String,
    pub bill_id: Option<String>,
    pub read: bool,
    pub read_at: Option<String>,
    pub sent_at: String,
    pub created_at: String,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        NotificationView {
            id: hex(n.id),
            user_id: n.user_id.to_hex(),
            kind: n.kind.as_str(),
            title: n.title,
            message: n.message,
            bill_id: n.bill_id.map(|id| id.to_hex()),
            read: n.read,
            read_at: n.read_at.map(iso),
            sent_at: iso(n.sent_at),
            created_at: iso(n.created_at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub subject: String,
    pub body: String,
    pub is_active: bool,
    pub version: i32,
    pub updated_at: Option<String>,
}

impl From<NotificationTemplate> for TemplateView {
    fn from(t: NotificationTemplate) -> Self {
        TemplateView {
            kind: t.kind.as_str(),
            subject: t.subject,
            body: t.body,
            is_active: t.is_active,
            version: t.version,
            updated_at: t.updated_at.map(iso),
        }
    }
}

pub fn list<T, V: From<T>>(items: Vec<T>) -> Vec<V> {
    items.into_iter().map(V::from).collect()
}
