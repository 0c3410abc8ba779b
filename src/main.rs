// main.rs
// Server wiring: loads configuration, initializes MongoDB state, starts the
// job scheduler and serves the JSON API.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use dormkeeper::{config::Config, error, routes, state, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    telemetry::init(&config.log_level)?;
    error::expose_internal_details(!config.production);

    let state = Arc::new(
        state::init_state(&config)
            .await
            .context("failed to initialize MongoDB state")?,
    );

    if config.scheduler_enabled {
        let handles = state.scheduler.start(state.clone());
        info!(jobs = handles.len(), "scheduler started");
    } else {
        info!("scheduler disabled");
    }

    let app = routes::router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
