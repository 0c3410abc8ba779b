use anyhow::{Context, Result};
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{Bson, DateTime, Document, doc, oid::ObjectId},
    options::ReturnDocument,
};
use tracing::info;

use crate::{
    error::{ApiError, ApiResult, is_duplicate_key},
    models::{Room, UserRole},
};

use super::{AppState, get_user_by_id};

#[derive(Debug, Clone)]
pub struct NewRoom {
    pub room_number: String,
    pub floor: Option<i32>,
    pub rent_price: f64,
    pub water_price: f64,
    pub electricity_price: f64,
    pub due_day: i32,
    pub deposit: f64,
}

/// Whitelisted room fields an admin may change. Occupancy moves only through assign/checkout.
#[derive(Debug, Clone, Default)]
pub struct RoomUpdate {
    pub room_number: Option<String>,
    pub floor: Option<i32>,
    pub rent_price: Option<f64>,
    pub water_price: Option<f64>,
    pub electricity_price: Option<f64>,
    pub due_day: Option<i32>,
    pub deposit: Option<f64>,
}

fn check_price(label: &str, value: f64) -> ApiResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ApiError::validation(format!("{label}ต้องไม่ติดลบ")));
    }
    Ok(())
}

fn check_due_day(day: i32) -> ApiResult<()> {
    if !(1..=31).contains(&day) {
        return Err(ApiError::validation("วันครบกำหนดต้องอยู่ระหว่าง 1 ถึง 31"));
    }
    Ok(())
}

fn validate_new_room(room: &NewRoom) -> ApiResult<()> {
    if room.room_number.trim().is_empty() {
        return Err(ApiError::validation("กรุณาระบุหมายเลขห้อง"));
    }
    check_price("ค่าเช่า", room.rent_price)?;
    check_price("ค่าน้ำ", room.water_price)?;
    check_price("ค่าไฟ", room.electricity_price)?;
    check_price("เงินประกัน", room.deposit)?;
    check_due_day(room.due_day)
}

fn room_number_taken() -> ApiError {
    ApiError::conflict("หมายเลขห้องนี้มีอยู่แล้ว")
}

pub async fn create_room(state: &AppState, room: NewRoom) -> ApiResult<Room> {
    validate_new_room(&room)?;
    let now = DateTime::now();
    let mut doc = Room {
        id: None,
        room_number: room.room_number.trim().to_string(),
        floor: room.floor,
        rent_price: room.rent_price,
        water_price: room.water_price,
        electricity_price: room.electricity_price,
        is_occupied: false,
        tenant_id: None,
        move_in_date: None,
        move_out_date: None,
        due_day: room.due_day,
        deposit: room.deposit,
        created_at: Some(now),
        updated_at: Some(now),
    };
    match state.rooms.insert_one(&doc).await {
        Ok(res) => {
            doc.id = res.inserted_id.as_object_id();
            Ok(doc)
        }
        Err(e) if is_duplicate_key(&e) => Err(room_number_taken()),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_room(state: &AppState, id: &ObjectId) -> Result<Option<Room>> {
    Ok(state.rooms.find_one(doc! { "_id": id }).await?)
}

pub async fn list_rooms(state: &AppState, occupied: Option<bool>) -> Result<Vec<Room>> {
    let filter = match occupied {
        Some(flag) => doc! { "is_occupied": flag },
        None => doc! {},
    };
    let cursor = state
        .rooms
        .find(filter)
        .sort(doc! { "room_number": 1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

pub async fn update_room(state: &AppState, id: &ObjectId, update: RoomUpdate) -> ApiResult<Room> {
    let mut set = Document::new();
    if let Some(number) = update.room_number {
        if number.trim().is_empty() {
            return Err(ApiError::validation("กรุณาระบุหมายเลขห้อง"));
        }
        set.insert("room_number", number.trim());
    }
    if let Some(floor) = update.floor {
        set.insert("floor", floor);
    }
    for (key, label, value) in [
        ("rent_price", "ค่าเช่า", update.rent_price),
        ("water_price", "ค่าน้ำ", update.water_price),
        ("electricity_price", "ค่าไฟ", update.electricity_price),
        ("deposit", "เงินประกัน", update.deposit),
    ] {
        if let Some(value) = value {
            check_price(label, value)?;
            set.insert(key, value);
        }
    }
    if let Some(day) = update.due_day {
        check_due_day(day)?;
        set.insert("due_day", day);
    }
    set.insert("updated_at", DateTime::now());

    let res = state
        .rooms
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await;
    match res {
        Ok(Some(room)) => Ok(room),
        Ok(None) => Err(ApiError::NotFound("ไม่พบห้อง")),
        Err(e) if is_duplicate_key(&e) => Err(room_number_taken()),
        Err(e) => Err(e.into()),
    }
}

/// Puts a tenant into a vacant room. The room flip is conditional so two concurrent
/// assignments cannot both win.
pub async fn assign_tenant(
    state: &AppState,
    room_id: &ObjectId,
    tenant_id: &ObjectId,
    move_in: DateTime,
) -> ApiResult<Room> {
    let room = get_room(state, room_id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบห้อง"))?;
    if room.is_occupied {
        return Err(ApiError::conflict("ห้องนี้มีผู้เช่าแล้ว"));
    }
    let tenant = get_user_by_id(state, tenant_id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบผู้ใช้"))?;
    if tenant.role != UserRole::Tenant {
        return Err(ApiError::validation("ผู้ใช้นี้ไม่ใช่ผู้เช่า"));
    }
    if tenant.room_id.is_some() {
        return Err(ApiError::conflict("ผู้เช่านี้มีห้องพักอยู่แล้ว"));
    }

    let updated = state
        .rooms
        .find_one_and_update(
            doc! { "_id": room_id, "is_occupied": false },
            doc! { "$set": {
                "is_occupied": true,
                "tenant_id": tenant_id,
                "move_in_date": move_in,
                "move_out_date": Bson::Null,
                "updated_at": DateTime::now(),
            }},
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| ApiError::conflict("ห้องนี้มีผู้เช่าแล้ว"))?;

    state
        .users
        .update_one(
            doc! { "_id": tenant_id },
            doc! { "$set": { "room_id": room_id, "updated_at": DateTime::now() } },
        )
        .await?;
    state.profiles.invalidate(tenant_id).await;

    info!(room = %updated.room_number, tenant = %tenant.email, "tenant assigned");
    Ok(updated)
}

/// Moves the current tenant out. Bills stay attached to the tenant who incurred them.
pub async fn checkout_tenant(
    state: &AppState,
    room_id: &ObjectId,
    move_out: DateTime,
) -> ApiResult<Room> {
    let room = get_room(state, room_id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบห้อง"))?;
    let tenant_id = match (room.is_occupied, room.tenant_id) {
        (true, Some(tenant_id)) => tenant_id,
        _ => return Err(ApiError::conflict("ห้องนี้ว่างอยู่แล้ว")),
    };

    let updated = state
        .rooms
        .find_one_and_update(
            doc! { "_id": room_id, "is_occupied": true, "tenant_id": tenant_id },
            doc! { "$set": {
                "is_occupied": false,
                "tenant_id": Bson::Null,
                "move_out_date": move_out,
                "updated_at": DateTime::now(),
            }},
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| ApiError::conflict("ห้องนี้ว่างอยู่แล้ว"))?;

    state
        .users
        .update_one(
            doc! { "_id": tenant_id, "room_id": room_id },
            doc! { "$set": { "room_id": Bson::Null, "updated_at": DateTime::now() } },
        )
        .await?;
    state.profiles.invalidate(&tenant_id).await;

    info!(room = %updated.room_number, "tenant checked out");
    Ok(updated)
}

pub async fn delete_room(state: &AppState, id: &ObjectId) -> ApiResult<()> {
    let room = get_room(state, id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบห้อง"))?;
    if room.is_occupied {
        return Err(ApiError::conflict("ไม่สามารถลบห้องที่มีผู้เช่าอยู่"));
    }
    let bills = state
        .bills
        .count_documents(doc! { "room_id": id })
        .await
        .context("counting room bills")?;
    if bills > 0 {
        return Err(ApiError::conflict("ไม่สามารถลบห้องที่มีประวัติบิล"));
    }
    state.rooms.delete_one(doc! { "_id": id }).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> NewRoom {
        NewRoom {
            room_number: "101".into(),
            floor: Some(1),
            rent_price: 3000.0,
            water_price: 100.0,
            electricity_price: 50.0,
            due_day: 5,
            deposit: 6000.0,
        }
    }

    #[test]
    fn accepts_a_valid_room() {
        assert!(validate_new_room(&room()).is_ok());
    }

    #[test]
    fn rejects_negative_prices_and_blank_numbers() {
        let mut r = room();
        r.water_price = -1.0;
        assert!(matches!(validate_new_room(&r), Err(ApiError::Validation(_))));

        let mut r = room();
        r.room_number = "  ".into();
        assert!(matches!(validate_new_room(&r), Err(ApiError::Validation(_))));
    }

    #[test]
    fn rejects_out_of_range_due_day() {
        let mut r = room();
        r.due_day = 0;
        assert!(validate_new_room(&r).is_err());
        r.due_day = 32;
        assert!(validate_new_room(&r).is_err());
    }
}
