#![allow(dead_code)]

use std::{
    env,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use mongodb::{
    Client,
    bson::{DateTime, oid::ObjectId},
};
use serde_json::Value;
use tower::ServiceExt; // for oneshot

use dormkeeper::{
    config::Config,
    models::UserRole,
    routes,
    state::{Actor, AppState, NewRoom, NewUser, assign_tenant, create_room, create_session, create_user, init_state},
};

/// Global lock so integration tests that mutate the DB run one-at-a-time.
static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestContext {
    pub state: Arc<AppState>,
    pub db_name: String,
    uri: String,
    _guard: MutexGuard<'static, ()>,
}

fn mongo_uri() -> String {
    let uri = env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    if uri.contains("serverSelectionTimeoutMS") {
        uri
    } else if uri.contains('?') {
        format!("{uri}&serverSelectionTimeoutMS=2000")
    } else {
        format!("{}/?serverSelectionTimeoutMS=2000", uri.trim_end_matches('/'))
    }
}

pub async fn setup_state() -> Option<TestContext> {
    let guard = TEST_DB_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let uri = mongo_uri();
    let db_name = format!(
        "dormkeepertest_{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis()
    );

    let client = match Client::with_uri_str(&uri).await {
        Ok(c) => c,
        Err(err) => {
            eprintln!("Skipping test; cannot connect to MongoDB: {err:?}");
            return None;
        }
    };
    if let Err(err) = client.database(&db_name).drop().await {
        eprintln!("Skipping test; cannot drop test DB: {err:?}");
        return None;
    }

    let config = Config::for_database(&uri, &db_name);
    match init_state(&config).await {
        Ok(state) => Some(TestContext {
            state: Arc::new(state),
            db_name,
            uri,
            _guard: guard,
        }),
        Err(err) => {
            eprintln!("Skipping test; init_state failed: {err:?}");
            None
        }
    }
}

pub async fn teardown(ctx: Option<TestContext>) {
    if let Some(ctx) = ctx {
        if let Ok(client) = Client::with_uri_str(&ctx.uri).await {
            let _ = client.database(&ctx.db_name).drop().await;
        }
        let _ = tokio::fs::remove_dir_all(&ctx.state.config.slip_storage_dir).await;
        drop(ctx);
    }
}

pub struct Account {
    pub actor: Actor,
    pub email: String,
    pub token: String,
}

pub async fn account(state: &AppState, email: &str, role: UserRole) -> Account {
    let id = create_user(
        state,
        NewUser {
            email: email.to_string(),
            password: "password123".to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            phone: None,
            role,
        },
    )
    .await
    .expect("create user");
    let token = create_session(state, email).await.expect("create session");
    Account {
        actor: Actor { id, role },
        email: email.to_string(),
        token,
    }
}

pub async fn room(state: &AppState, number: &str) -> ObjectId {
    create_room(
        state,
        NewRoom {
            room_number: number.to_string(),
            floor: Some(1),
            rent_price: 3000.0,
            water_price: 100.0,
            electricity_price: 50.0,
            due_day: 5,
            deposit: 6000.0,
        },
    )
    .await
    .expect("create room")
    .id
    .expect("room id")
}

/// An occupied room with its tenant.
pub async fn occupied_room(state: &AppState, number: &str, tenant: &Account) -> ObjectId {
    let room_id = room(state, number).await;
    assign_tenant(state, &room_id, &tenant.actor.id, DateTime::now())
        .await
        .expect("assign tenant");
    room_id
}

pub fn png_base64() -> String {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0u8; 64]);
    STANDARD.encode(bytes)
}

pub fn app(state: Arc<AppState>) -> Router {
    routes::router(state)
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
