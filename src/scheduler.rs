// scheduler.rs
// Named recurring jobs on cron schedules evaluated in UTC+7.
//
// The scheduler is built once at startup from injected job definitions. Each
// job can be toggled, inspected, or run on demand. Scheduled fires retry a
// failing body with exponential backoff; manual runs execute exactly once.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{error, info, warn};

use crate::period::{local_offset, to_local};

pub type JobFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;
pub type JobHandler<C> = Arc<dyn Fn(Arc<C>) -> JobFuture + Send + Sync>;

/// Wraps an async fn/closure as a [`JobHandler`].
pub fn job_fn<C, F, Fut>(f: F) -> JobHandler<C>
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    Arc::new(move |ctx: Arc<C>| -> JobFuture { Box::pin(f(ctx)) })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobName {
    #[serde(rename = "paymentReminder5Days")]
    PaymentReminder5Days,
    #[serde(rename = "paymentReminder1Day")]
    PaymentReminder1Day,
    #[serde(rename = "overdueCheck")]
    OverdueCheck,
    #[serde(rename = "monthlyBillGeneration")]
    MonthlyBillGeneration,
    #[serde(rename = "notificationCleanup")]
    NotificationCleanup,
}

impl JobName {
    pub const ALL: [JobName; 5] = [
        JobName::PaymentReminder5Days,
        JobName::PaymentReminder1Day,
        JobName::OverdueCheck,
        JobName::MonthlyBillGeneration,
        JobName::NotificationCleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::PaymentReminder5Days => "paymentReminder5Days",
            JobName::PaymentReminder1Day => "paymentReminder1Day",
            JobName::OverdueCheck => "overdueCheck",
            JobName::MonthlyBillGeneration => "monthlyBillGeneration",
            JobName::NotificationCleanup => "notificationCleanup",
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobName {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| SchedulerError::UnknownJob(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error("job {0} is not registered")]
    NotRegistered(JobName),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

/// Outcome of one job invocation (including any retries).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub job: JobName,
    pub trigger: RunTrigger,
    pub started_at: String,
    pub finished_at: String,
    pub attempts: u32,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub name: JobName,
    pub schedule: String,
    pub enabled: bool,
    pub running: bool,
    pub next_run: Option<String>,
    pub last_run: Option<JobRun>,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn delay_before(&self, attempt: u32) -> Duration {
        // attempt is 1-based; the wait before attempt n is base * 2^(n-2)
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(2))
    }
}

pub struct JobDefinition<C> {
    pub name: JobName,
    pub cron: String,
    schedule: Schedule,
    handler: JobHandler<C>,
}

impl<C> JobDefinition<C> {
    pub fn new(name: JobName, cron: &str, handler: JobHandler<C>) -> Result<Self> {
        let schedule = Schedule::from_str(cron)
            .with_context(|| format!("invalid cron expression for {name}: {cron}"))?;
        Ok(Self {
            name,
            cron: cron.to_string(),
            schedule,
            handler,
        })
    }
}

struct JobSlot<C> {
    definition: JobDefinition<C>,
    enabled: AtomicBool,
    running: AtomicUsize,
    last_run: RwLock<Option<JobRun>>,
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl<'a> RunningGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Scheduler<C> {
    jobs: Arc<Vec<Arc<JobSlot<C>>>>,
    retry: RetryPolicy,
}

impl<C> Clone for Scheduler<C> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            retry: self.retry,
        }
    }
}

fn timestamp(instant: DateTime<Utc>) -> String {
    to_local(instant).to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl<C> Scheduler<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(definitions: Vec<JobDefinition<C>>, retry: RetryPolicy) -> Self {
        let jobs = definitions
            .into_iter()
            .map(|definition| {
                Arc::new(JobSlot {
                    definition,
                    enabled: AtomicBool::new(true),
                    running: AtomicUsize::new(0),
                    last_run: RwLock::new(None),
                })
            })
            .collect();
        Self {
            jobs: Arc::new(jobs),
            retry,
        }
    }

    fn slot(&self, name: JobName) -> Result<&Arc<JobSlot<C>>, SchedulerError> {
        self.jobs
            .iter()
            .find(|slot| slot.definition.name == name)
            .ok_or(SchedulerError::NotRegistered(name))
    }

    pub fn next_fire(&self, name: JobName, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let slot = self.slot(name).ok()?;
        next_fire(&slot.definition.schedule, after)
    }

    pub async fn status(&self, now: DateTime<Utc>) -> Vec<JobStatus> {
        let mut statuses = Vec::with_capacity(self.jobs.len());
        for slot in self.jobs.iter() {
            let enabled = slot.enabled.load(Ordering::SeqCst);
            statuses.push(JobStatus {
                name: slot.definition.name,
                schedule: slot.definition.cron.clone(),
                enabled,
                running: slot.running.load(Ordering::SeqCst) > 0,
                next_run: if enabled {
                    next_fire(&slot.definition.schedule, now).map(timestamp)
                } else {
                    None
                },
                last_run: slot.last_run.read().await.clone(),
            });
        }
        statuses
    }

    pub fn set_enabled(&self, name: JobName, enabled: bool) -> Result<(), SchedulerError> {
        let slot = self.slot(name)?;
        slot.enabled.store(enabled, Ordering::SeqCst);
        info!(job = %name, enabled, "job toggled");
        Ok(())
    }

    /// Runs a job body once on the caller's task. The schedule is untouched.
    pub async fn run_now(&self, name: JobName, ctx: Arc<C>) -> Result<JobRun, SchedulerError> {
        let slot = self.slot(name)?.clone();
        Ok(execute(&slot, ctx, RunTrigger::Manual, 1, self.retry.base_delay).await)
    }

    async fn fire(&self, slot: &Arc<JobSlot<C>>, ctx: Arc<C>) -> JobRun {
        execute(
            slot,
            ctx,
            RunTrigger::Scheduled,
            self.retry.max_attempts,
            self.retry.base_delay,
        )
        .await
    }

    /// Spawns one timer task per job.
    pub fn start(&self, ctx: Arc<C>) -> Vec<JoinHandle<()>> {
        self.jobs
            .iter()
            .map(|slot| {
                let scheduler = self.clone();
                let slot = slot.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    info!(job = %slot.definition.name, cron = %slot.definition.cron, "job scheduled");
                    loop {
                        let now = Utc::now();
                        let Some(next) = next_fire(&slot.definition.schedule, now) else {
                            warn!(job = %slot.definition.name, "schedule has no upcoming fire time");
                            break;
                        };
                        tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;
                        if !slot.enabled.load(Ordering::SeqCst) {
                            continue;
                        }
                        scheduler.fire(&slot, ctx.clone()).await;
                    }
                })
            })
            .collect()
    }
}

fn next_fire(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&local_offset()))
        .next()
        .map(|dt| dt.with_timezone(&Utc))
}

async fn execute<C>(
    slot: &Arc<JobSlot<C>>,
    ctx: Arc<C>,
    trigger: RunTrigger,
    max_attempts: u32,
    base_delay: Duration,
) -> JobRun
where
    C: Send + Sync + 'static,
{
    let name = slot.definition.name;
    let _running = RunningGuard::enter(&slot.running);
    let started_at = Utc::now();
    let policy = RetryPolicy {
        max_attempts: max_attempts.max(1),
        base_delay,
    };

    let mut attempts = 0;
    let outcome = loop {
        attempts += 1;
        if attempts > 1 {
            tokio::time::sleep(policy.delay_before(attempts)).await;
        }
        info!(job = %name, ?trigger, attempt = attempts, "job started");
        match (slot.definition.handler)(ctx.clone()).await {
            Ok(message) => break Ok(message),
            Err(err) if attempts < policy.max_attempts => {
                warn!(job = %name, attempt = attempts, error = %err, "job failed, retrying");
            }
            Err(err) => break Err(err),
        }
    };

    let run = match outcome {
        Ok(message) => {
            info!(job = %name, attempts, %message, "job finished");
            JobRun {
                job: name,
                trigger,
                started_at: timestamp(started_at),
                finished_at: timestamp(Utc::now()),
                attempts,
                success: true,
                message,
            }
        }
        Err(err) => {
            error!(job = %name, attempts, error = ?err, "job failed");
            JobRun {
                job: name,
                trigger,
                started_at: timestamp(started_at),
                finished_at: timestamp(Utc::now()),
                attempts,
                success: false,
                message: format!("{err:#}"),
            }
        }
    };

    *slot.last_run.write().await = Some(run.clone());
    run
}
