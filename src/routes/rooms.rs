// routes/rooms.rs
// Room registry: admin CRUD plus tenant assignment and checkout.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    session::SessionUser,
    state::{
        AppState, NewRoom, RoomUpdate, assign_tenant, checkout_tenant, create_room, delete_room,
        get_room, list_rooms, update_room,
    },
};

use super::{
    helpers::{ApiJson, parse_id, parse_instant},
    views::{RoomView, list},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreateRequest {
    pub room_number: Option<String>,
    pub floor: Option<i32>,
    pub rent_price: Option<f64>,
    #[serde(default)]
    pub water_price: f64,
    #[serde(default)]
    pub electricity_price: f64,
    pub due_day: Option<i32>,
    #[serde(default)]
    pub deposit: f64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoomUpdateRequest {
    pub room_number: Option<String>,
    pub floor: Option<i32>,
    pub rent_price: Option<f64>,
    pub water_price: Option<f64>,
    pub electricity_price: Option<f64>,
    pub due_day: Option<i32>,
    pub deposit: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub tenant_id: Option<String>,
    pub move_in_date: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub move_out_date: Option<String>,
}

#[derive(Deserialize)]
pub struct RoomsQuery {
    pub occupied: Option<bool>,
}

pub async fn rooms_index(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Query(query): Query<RoomsQuery>,
) -> ApiResult<Json<Vec<RoomView>>> {
    let rooms = list_rooms(&st, query.occupied).await?;
    let rooms = if session_user.is_admin() {
        rooms
    } else {
        rooms
            .into_iter()
            .filter(|room| room.tenant_id.as_ref() == Some(session_user.user_id()))
            .collect()
    };
    Ok(Json(list(rooms)))
}

pub async fn rooms_show(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
) -> ApiResult<Json<RoomView>> {
    let id = parse_id(&id)?;
    let room = get_room(&st, &id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบห้อง"))?;
    if !session_user.is_admin() && room.tenant_id.as_ref() != Some(session_user.user_id()) {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(room.into()))
}

pub async fn rooms_create(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    ApiJson(body): ApiJson<RoomCreateRequest>,
) -> ApiResult<impl IntoResponse> {
    session_user.require_admin()?;
    let (Some(room_number), Some(rent_price)) = (body.room_number, body.rent_price) else {
        return Err(ApiError::validation("กรุณาระบุหมายเลขห้องและค่าเช่า"));
    };
    let room = create_room(
        &st,
        NewRoom {
            room_number,
            floor: body.floor,
            rent_price,
            water_price: body.water_price,
            electricity_price: body.electricity_price,
            due_day: body.due_day.unwrap_or(5),
            deposit: body.deposit,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(RoomView::from(room))))
}

pub async fn rooms_update(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RoomUpdateRequest>,
) -> ApiResult<Json<RoomView>> {
    session_user.require_admin()?;
    let id = parse_id(&id)?;
    let update = RoomUpdate {
        room_number: body.room_number,
        floor: body.floor,
        rent_price: body.rent_price,
        water_price: body.water_price,
        electricity_price: body.electricity_price,
        due_day: body.due_day,
        deposit: body.deposit,
    };
    Ok(Json(update_room(&st, &id, update).await?.into()))
}

pub async fn rooms_delete(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    session_user.require_admin()?;
    delete_room(&st, &parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rooms_assign(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AssignRequest>,
) -> ApiResult<Json<RoomView>> {
    session_user.require_admin()?;
    let room_id = parse_id(&id)?;
    let tenant_id = body
        .tenant_id
        .as_deref()
        .ok_or_else(|| ApiError::validation("กรุณาระบุผู้เช่า"))
        .and_then(parse_id)?;
    let move_in = parse_instant(body.move_in_date.as_deref())?;
    Ok(Json(assign_tenant(&st, &room_id, &tenant_id, move_in).await?.into()))
}

pub async fn rooms_checkout(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    Path(id): Path<String>,
    body: Option<Json<CheckoutRequest>>,
) -> ApiResult<Json<RoomView>> {
    session_user.require_admin()?;
    let room_id = parse_id(&id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let move_out = parse_instant(body.move_out_date.as_deref())?;
    Ok(Json(checkout_tenant(&st, &room_id, move_out).await?.into()))
}
