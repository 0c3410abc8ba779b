// state module: AppState, initialization, and re-exports of submodules.

use anyhow::{Context, Result};
use mongodb::{Client, Collection, bson::oid::ObjectId};
use tracing::info;

use crate::{
    cache::{PROFILE_TTL, TtlCache},
    config::Config,
    jobs,
    mailer::Mailer,
    models::{Bill, Notification, NotificationTemplate, Payment, Room, Session, User, UserRole},
    scheduler::{RetryPolicy, Scheduler},
    storage::SlipStorage,
};

mod bills;
mod notifications;
mod payments;
mod reminders;
mod rooms;
mod seed;
mod templates;
mod users;

pub use bills::*;
pub use notifications::*;
pub use payments::*;
pub use reminders::*;
pub use rooms::*;
pub use templates::*;
pub use users::*;

pub const SESSION_TTL_SECONDS: u64 = 60 * 60 * 24; // 1 day

pub struct AppState {
    pub config: Config,
    pub users: Collection<User>,
    pub sessions: Collection<Session>,
    pub rooms: Collection<Room>,
    pub bills: Collection<Bill>,
    pub payments: Collection<Payment>,
    pub notifications: Collection<Notification>,
    pub templates: Collection<NotificationTemplate>,
    pub profiles: TtlCache<ObjectId, UserProfile>,
    pub mailer: Mailer,
    pub storage: SlipStorage,
    pub scheduler: Scheduler<AppState>,
}

/// The authenticated caller of a state operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: ObjectId,
    pub role: UserRole,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Admins may act on anyone; everyone else only on themselves.
    pub fn can_access(&self, owner: &ObjectId) -> bool {
        self.is_admin() || &self.id == owner
    }
}

pub async fn init_state(config: &Config) -> Result<AppState> {
    let client = Client::with_uri_str(&config.mongodb_uri)
        .await
        .context("connecting to MongoDB")?;
    let db = client.database(&config.mongodb_db);

    seed::ensure_collections(&db).await?;
    seed::ensure_indexes(&db).await?;

    let mailer = Mailer::from_config(config.smtp.as_ref())?;
    let storage = SlipStorage::new(config.slip_storage_dir.clone(), &config.public_base_url);
    let scheduler = Scheduler::new(jobs::default_jobs()?, RetryPolicy::default());

    let state = AppState {
        users: db.collection::<User>("users"),
        sessions: db.collection::<Session>("sessions"),
        rooms: db.collection::<Room>("rooms"),
        bills: db.collection::<Bill>("bills"),
        payments: db.collection::<Payment>("payments"),
        notifications: db.collection::<Notification>("notifications"),
        templates: db.collection::<NotificationTemplate>("notification_templates"),
        profiles: TtlCache::new(PROFILE_TTL),
        mailer,
        storage,
        scheduler,
        config: config.clone(),
    };

    seed_default_templates(&state).await?;
    if let Some(admin) = state.config.bootstrap_admin.clone() {
        seed::ensure_bootstrap_admin(&state, &admin).await?;
    }

    info!(db = %state.config.mongodb_db, "state initialized");
    Ok(state)
}
