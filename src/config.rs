// config.rs
// Environment-driven configuration, loaded once at startup.

use std::{env, fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub bind_addr: SocketAddr,
    pub public_base_url: String,
    pub slip_storage_dir: PathBuf,
    pub scheduler_enabled: bool,
    pub log_level: String,
    pub production: bool,
    pub smtp: Option<SmtpConfig>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let smtp = match optional("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or("SMTP_PORT", 587)?,
                username: optional("SMTP_USERNAME"),
                password: optional("SMTP_PASSWORD"),
                from: string_or("SMTP_FROM", "noreply@dormkeeper.local"),
            }),
            None => {
                info!("SMTP_HOST not set, email delivery disabled");
                None
            }
        };

        let bootstrap_admin = match (
            optional("BOOTSTRAP_ADMIN_EMAIL"),
            optional("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            _ => None,
        };

        Ok(Self {
            mongodb_uri: string_or("MONGODB_URI", "mongodb://localhost:27017"),
            mongodb_db: string_or("MONGODB_DB", "dormkeeper"),
            bind_addr: parse_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            public_base_url: string_or("PUBLIC_BASE_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            slip_storage_dir: PathBuf::from(string_or("SLIP_STORAGE_DIR", "./data/slips")),
            scheduler_enabled: parse_or("SCHEDULER_ENABLED", true)?,
            log_level: string_or("LOG_LEVEL", "info"),
            production: string_or("APP_ENV", "development").eq_ignore_ascii_case("production"),
            smtp,
            bootstrap_admin,
        })
    }

    /// Configuration pointing at a local MongoDB database, used by tests and tooling.
    pub fn for_database(mongodb_uri: &str, mongodb_db: &str) -> Self {
        Self {
            mongodb_uri: mongodb_uri.to_string(),
            mongodb_db: mongodb_db.to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            public_base_url: "http://localhost:8080".to_string(),
            slip_storage_dir: env::temp_dir().join(format!("{mongodb_db}_slips")),
            scheduler_enabled: false,
            log_level: "warn".to_string(),
            production: false,
            smtp: None,
            bootstrap_admin: None,
        }
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn string_or(key: &str, default: &str) -> String {
    optional(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match optional(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
