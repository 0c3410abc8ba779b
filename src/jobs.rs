// jobs.rs
// The service's recurring jobs, wired to their state operations.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use crate::{
    scheduler::{JobDefinition, JobName, job_fn},
    state::{
        AppState, cleanup_read_notifications, generate_monthly_bills, send_due_reminders,
        sweep_overdue_bills,
    },
};

/// Six-field cron expressions (seconds first), evaluated in UTC+7.
pub const SCHEDULES: [(JobName, &str); 5] = [
    (JobName::PaymentReminder5Days, "0 0 9 * * *"),
    (JobName::PaymentReminder1Day, "0 0 18 * * *"),
    (JobName::OverdueCheck, "0 0 10 * * *"),
    (JobName::MonthlyBillGeneration, "0 0 8 1 * *"),
    (JobName::NotificationCleanup, "0 0 3 * * Sun"),
];

async fn remind_in_five_days(state: Arc<AppState>) -> Result<String> {
    let sent = send_due_reminders(&state, Utc::now(), 5).await?;
    Ok(format!("{sent} reminders sent"))
}

async fn remind_in_one_day(state: Arc<AppState>) -> Result<String> {
    let sent = send_due_reminders(&state, Utc::now(), 1).await?;
    Ok(format!("{sent} reminders sent"))
}

async fn check_overdue(state: Arc<AppState>) -> Result<String> {
    let sweep = sweep_overdue_bills(&state, Utc::now()).await?;
    Ok(format!(
        "{} bills marked overdue, {} notices sent",
        sweep.marked_overdue, sweep.notified
    ))
}

async fn generate_bills(state: Arc<AppState>) -> Result<String> {
    let summary = generate_monthly_bills(&state, Utc::now()).await?;
    Ok(format!(
        "{} created, {} skipped, {} failed",
        summary.created, summary.skipped, summary.failed
    ))
}

async fn clean_notifications(state: Arc<AppState>) -> Result<String> {
    let deleted = cleanup_read_notifications(&state, Utc::now()).await?;
    Ok(format!("{deleted} read notifications deleted"))
}

pub fn default_jobs() -> Result<Vec<JobDefinition<AppState>>> {
    SCHEDULES
        .iter()
        .map(|(name, cron)| {
            let handler = match name {
                JobName::PaymentReminder5Days => job_fn(remind_in_five_days),
                JobName::PaymentReminder1Day => job_fn(remind_in_one_day),
                JobName::OverdueCheck => job_fn(check_overdue),
                JobName::MonthlyBillGeneration => job_fn(generate_bills),
                JobName::NotificationCleanup => job_fn(clean_notifications),
            };
            JobDefinition::new(*name, cron, handler)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_job_has_a_valid_schedule() {
        let jobs = default_jobs().unwrap();
        let names: Vec<JobName> = jobs.iter().map(|job| job.name).collect();
        assert_eq!(names, JobName::ALL.to_vec());
    }
}
