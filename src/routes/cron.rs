// routes/cron.rs
// GET /cron/status, POST /cron/run, POST /cron/toggle (admin only)

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    error::{ApiError, ApiResult},
    scheduler::{JobName, JobRun, JobStatus},
    session::SessionUser,
    state::AppState,
};

use super::helpers::ApiJson;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub job_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    pub job_name: Option<String>,
    pub enabled: Option<bool>,
}

fn job_name(raw: Option<&str>) -> ApiResult<JobName> {
    let raw = raw.ok_or_else(|| ApiError::validation("กรุณาระบุชื่องาน"))?;
    Ok(raw.trim().parse::<JobName>()?)
}

pub async fn cron_status(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
) -> ApiResult<Json<Value>> {
    session_user.require_admin()?;
    let jobs: Vec<JobStatus> = st.scheduler.status(Utc::now()).await;
    Ok(Json(json!({
        "schedulerEnabled": st.config.scheduler_enabled,
        "jobs": jobs,
    })))
}

/// Runs the job body once on this request and reports the outcome.
pub async fn cron_run(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    ApiJson(body): ApiJson<RunRequest>,
) -> ApiResult<Json<JobRun>> {
    session_user.require_admin()?;
    let name = job_name(body.job_name.as_deref())?;
    let run = st.scheduler.run_now(name, st.clone()).await?;
    Ok(Json(run))
}

pub async fn cron_toggle(
    State(st): State<Arc<AppState>>,
    session_user: SessionUser,
    ApiJson(body): ApiJson<ToggleRequest>,
) -> ApiResult<Json<Value>> {
    session_user.require_admin()?;
    let name = job_name(body.job_name.as_deref())?;
    let enabled = body
        .enabled
        .ok_or_else(|| ApiError::validation("กรุณาระบุสถานะเปิดหรือปิด"))?;
    st.scheduler.set_enabled(name, enabled)?;
    Ok(Json(json!({ "jobName": name, "enabled": enabled })))
}
