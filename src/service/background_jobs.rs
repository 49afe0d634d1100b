// service/background_jobs.rs
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};

use crate::{
    db::{paymentdb::PaymentExt, PaymentStore},
    service::{
        error::ServiceError,
        notifier,
        payment_pipeline::{describe_commission, PaymentPipeline},
        ranking::find_rank_anomalies,
    },
    AppState,
};

/// Commissions looked at per pass.
const RETRY_BATCH_SIZE: i64 = 50;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RetryPassSummary {
    pub attempted: usize,
    pub paid: usize,
    pub failed: usize,
}

/// Periodically retry referral commissions that are still unpaid.
pub async fn start_commission_retry_job(app_state: Arc<AppState>) {
    let every = app_state.env.commission_retry_interval;
    if every.is_zero() {
        tracing::info!("Commission retry job disabled");
        return;
    }

    let mut interval = interval(every);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;

        tracing::info!("Running commission retry job at {}", Utc::now());

        match run_commission_retry_pass(
            &app_state.pipeline,
            app_state.env.commission_max_attempts,
            every,
        )
        .await
        {
            Ok(summary) => tracing::info!(
                "Commission retry job completed: {} attempted, {} paid, {} failed",
                summary.attempted,
                summary.paid,
                summary.failed
            ),
            Err(e) => tracing::error!("Commission retry job failed: {}", e),
        }
    }
}

/// One retry pass over commissions idle for at least `idle_for`.
pub async fn run_commission_retry_pass(
    pipeline: &PaymentPipeline,
    max_attempts: i32,
    idle_for: Duration,
) -> Result<RetryPassSummary, ServiceError> {
    let idle_for = chrono::Duration::from_std(idle_for).unwrap_or_else(|_| chrono::Duration::zero());
    let due = pipeline
        .store()
        .get_retryable_commissions(max_attempts, idle_for, RETRY_BATCH_SIZE)
        .await?;

    let mut summary = RetryPassSummary::default();

    for commission in due {
        summary.attempted += 1;
        tracing::debug!(
            "Retrying commission for event {} ({}, {} attempts so far)",
            commission.event_id,
            commission.status.to_str(),
            commission.attempts
        );

        let (payer, referrer, outcome) = match pipeline.settlement().retry_commission(&commission).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Skipping commission for event {}: {}", commission.event_id, e);
                summary.failed += 1;
                continue;
            }
        };

        if outcome.is_paid() {
            summary.paid += 1;
        } else {
            summary.failed += 1;
        }

        let message = format!(
            "Retried commission owed to {} for {}. {}",
            referrer.display_name(),
            payer.display_name(),
            describe_commission(&outcome)
        );
        notifier::dispatch(pipeline.notifier(), message);
    }

    Ok(summary)
}

/// Checks the graduatoria is still the dense sequence 1..N.
/// Returns the offending ranks; an empty list means healthy.
pub async fn audit_ranks(store: &dyn PaymentStore) -> Result<Vec<i32>, sqlx::Error> {
    let ranked = store.get_users_by_rank().await?;
    let ranks: Vec<i32> = ranked.iter().map(|u| u.rank).collect();
    let anomalies = find_rank_anomalies(&ranks);

    if anomalies.is_empty() {
        tracing::info!("Rank audit passed: {} ranked users", ranked.len());
    } else {
        tracing::warn!(
            "Rank audit found {} anomalies among {} ranked users: {:?}",
            anomalies.len(),
            ranked.len(),
            anomalies
        );
    }

    Ok(anomalies)
}
