use anyhow::Result;
use mongodb::{
    Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tracing::info;

use crate::{config::BootstrapAdmin, models::UserRole};

use super::{AppState, NewUser, admin_exists, create_user};

const COLLECTIONS: [&str; 7] = [
    "users",
    "sessions",
    "rooms",
    "bills",
    "payments",
    "notifications",
    "notification_templates",
];

pub(super) async fn ensure_collections(db: &Database) -> Result<()> {
    let existing = db.list_collection_names().await?;
    for name in COLLECTIONS {
        if !existing.iter().any(|e| e == name) {
            db.create_collection(name).await?;
        }
    }
    Ok(())
}

fn unique_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .unique(true)
                .name(name.to_string())
                .build(),
        )
        .build()
}

fn plain_index(keys: Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

pub(super) async fn ensure_indexes(db: &Database) -> Result<()> {
    db.collection::<Document>("users")
        .create_index(unique_index(doc! { "email": 1 }, "email_unique"))
        .await?;
    db.collection::<Document>("sessions")
        .create_index(unique_index(doc! { "token": 1 }, "token_unique"))
        .await?;
    db.collection::<Document>("rooms")
        .create_index(unique_index(doc! { "room_number": 1 }, "room_number_unique"))
        .await?;
    db.collection::<Document>("bills")
        .create_index(unique_index(
            doc! { "room_id": 1, "month": 1, "year": 1 },
            "room_period_unique",
        ))
        .await?;
    db.collection::<Document>("bills")
        .create_index(plain_index(doc! { "status": 1, "due_date": 1 }))
        .await?;
    db.collection::<Document>("payments")
        .create_index(plain_index(doc! { "bill_id": 1, "created_at": -1 }))
        .await?;
    db.collection::<Document>("payments")
        .create_index(plain_index(doc! { "tenant_id": 1, "created_at": -1 }))
        .await?;
    db.collection::<Document>("notifications")
        .create_index(plain_index(doc! { "user_id": 1, "read": 1, "created_at": -1 }))
        .await?;
    db.collection::<Document>("notification_templates")
        .create_index(unique_index(doc! { "type": 1 }, "type_unique"))
        .await?;
    Ok(())
}

pub(super) async fn ensure_bootstrap_admin(state: &AppState, admin: &BootstrapAdmin) -> Result<()> {
    if admin_exists(state).await? {
        return Ok(());
    }
    create_user(
        state,
        NewUser {
            email: admin.email.clone(),
            password: admin.password.clone(),
            name: "Administrator".to_string(),
            phone: None,
            role: UserRole::Admin,
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("bootstrap admin: {e}"))?;
    info!(email = %admin.email, "bootstrap admin created");
    Ok(())
}
