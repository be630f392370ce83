//! Periodic sweeps that expire stale pending offers and auto-complete
//! offers the buyer never confirmed.
//!
//! Deadlines are only enforced here: an offer past its deadline stays in
//! its pre-timeout status until the next sweep observes it, so staleness is
//! bounded by roughly one sweep interval. Both sweeps go through
//! [`OfferService::transition`] with [`Actor::System`], so they share the
//! same validation and conditional write as user requests and are safe to
//! run repeatedly or concurrently with them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::error::OfferError;
use crate::models::{Actor, OfferStatus};
use crate::offers::OfferService;

/// Outcome of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub due: usize,
    pub transitioned: usize,
    pub skipped: usize,
}

pub struct Sweeper {
    offers: Arc<OfferService>,
    batch_size: i64,
}

impl Sweeper {
    pub fn new(offers: Arc<OfferService>, batch_size: i64) -> Self {
        Self {
            offers,
            batch_size: batch_size.max(1),
        }
    }

    /// Move `pending` offers past `valid_until` to `expired`.
    pub async fn sweep_expirations(&self, now: DateTime<Utc>) -> Result<SweepReport, OfferError> {
        let due = self
            .offers
            .store()
            .due_expirations(now, self.batch_size)
            .await?;
        Ok(self.advance(due, OfferStatus::Expired, now).await)
    }

    /// Move `to_receive` offers past `auto_complete_at` to `completed`.
    pub async fn sweep_auto_completions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, OfferError> {
        let due = self
            .offers
            .store()
            .due_auto_completions(now, self.batch_size)
            .await?;
        Ok(self.advance(due, OfferStatus::Completed, now).await)
    }

    /// A failure on one offer is logged and skipped; the batch continues.
    async fn advance(&self, due: Vec<Uuid>, to: OfferStatus, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };

        for offer_id in due {
            match self
                .offers
                .transition(offer_id, Actor::System, to, None, now)
                .await
            {
                Ok(_) => report.transitioned += 1,
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!(
                        offer_id = %offer_id,
                        target = %to,
                        kind = e.kind(),
                        error = %e,
                        "Sweep skipped offer"
                    );
                }
            }
        }

        report
    }

    /// Run both sweeps once. Errors are logged; the next tick retries.
    pub async fn tick(&self, now: DateTime<Utc>) {
        for (name, result) in [
            ("expirations", self.sweep_expirations(now).await),
            ("auto_completions", self.sweep_auto_completions(now).await),
        ] {
            match result {
                Ok(report) if report.due > 0 => tracing::info!(
                    sweep = name,
                    due = report.due,
                    transitioned = report.transitioned,
                    skipped = report.skipped,
                    "Sweep finished"
                ),
                Ok(_) => tracing::debug!(sweep = name, "Sweep found nothing due"),
                Err(e) => tracing::error!(sweep = name, error = %e, "Sweep failed"),
            }
        }
    }

    /// Register a repeating job that ticks every `every` and start it.
    pub async fn start(self: Arc<Self>, every: Duration) -> Result<JobScheduler, JobSchedulerError> {
        let scheduler = JobScheduler::new().await?;
        let job = Job::new_repeated_async(every, move |_id, _lock| {
            let sweeper = Arc::clone(&self);
            Box::pin(async move {
                sweeper.tick(Utc::now()).await;
            })
        })?;
        scheduler.add(job).await?;
        scheduler.start().await?;

        tracing::info!(interval_secs = every.as_secs(), "Offer sweeper scheduled");
        Ok(scheduler)
    }
}
