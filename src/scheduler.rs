//! Cron jobs that drive the newsletter cycle.
//!
//! ```text
//! 03:00 daily           ─► process_frequency_group(Daily)
//! 04:00 every Monday    ─► process_frequency_group(Weekly)
//! 05:00 on the 1st      ─► process_frequency_group(Monthly)
//! every 5 minutes       ─► dispatch_due(now)
//! ```

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::models::DeliveryFrequency;
use crate::newsletter::NewsletterService;

pub const DAILY_SCHEDULE: &str = "0 0 3 * * *";
pub const WEEKLY_SCHEDULE: &str = "0 0 4 * * Mon";
pub const MONTHLY_SCHEDULE: &str = "0 0 5 1 * *";
pub const DISPATCH_SCHEDULE: &str = "0 */5 * * * *";

pub fn schedule_for(frequency: DeliveryFrequency) -> &'static str {
    match frequency {
        DeliveryFrequency::Daily => DAILY_SCHEDULE,
        DeliveryFrequency::Weekly => WEEKLY_SCHEDULE,
        DeliveryFrequency::Monthly => MONTHLY_SCHEDULE,
    }
}

/// Start all scheduled tasks
pub async fn start_scheduler(service: Arc<NewsletterService>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    for frequency in DeliveryFrequency::ALL {
        let group_service = service.clone();
        let job = Job::new_async(schedule_for(frequency), move |_uuid, _lock| {
            let service = group_service.clone();
            Box::pin(async move {
                match service.process_frequency_group(frequency).await {
                    Ok(delivered) => tracing::info!("{} run delivered {} newsletters", frequency, delivered),
                    Err(e) => tracing::error!("{} newsletter task failed: {}", frequency, e),
                }
            })
        })?;
        scheduler.add(job).await?;
    }

    let dispatch_service = service.clone();
    let dispatch_job = Job::new_async(DISPATCH_SCHEDULE, move |_uuid, _lock| {
        let service = dispatch_service.clone();
        Box::pin(async move {
            if let Err(e) = service.dispatch_due(Utc::now()).await {
                tracing::error!("Scheduled newsletter dispatch failed: {}", e);
            }
        })
    })?;

    scheduler.add(dispatch_job).await?;
    scheduler.start().await?;

    tracing::info!("Scheduled tasks started (daily, weekly and monthly digests, dispatch every 5 minutes)");
    Ok(scheduler)
}
