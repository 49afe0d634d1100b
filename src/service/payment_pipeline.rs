// service/payment_pipeline.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::Config,
    db::{
        paymentdb::{CommitOutcome, NewPayment, PaymentExt},
        PaymentStore,
    },
    dtos::webhookdtos::WebhookEvent,
    service::{
        error::ServiceError,
        notifier::{self, Notifier},
        payout_provider::PayoutSender,
        ranking::RankEntry,
        settlement::{CommissionOutcome, SettlementEngine},
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSummary {
    pub event_id: String,
    pub payer_id: Uuid,
    pub entry: RankEntry,
    pub rank: i32,
    pub referrer_name: Option<String>,
    pub commission: Option<CommissionOutcome>,
    /// Text sent to the notification channel.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Processed(PaymentSummary),
    /// Event id seen before, nothing changed.
    Duplicate { event_id: String },
    /// Not a settlement event.
    Ignored { event_type: String },
}

/// Outcome sentence for a commission attempt.
pub fn describe_commission(outcome: &CommissionOutcome) -> String {
    match outcome {
        CommissionOutcome::Paid { .. } => "Referral paid successfully.".to_string(),
        CommissionOutcome::Failed { reason } => format!("Referral payout error: {}.", reason),
        CommissionOutcome::Skipped => "Referral commission already settled.".to_string(),
    }
}

/// Sequences verification output through ranking, settlement and notification.
pub struct PaymentPipeline {
    store: Arc<dyn PaymentStore>,
    settlement: SettlementEngine,
    notifier: Arc<dyn Notifier>,
    commission_sats: i64,
    currency: String,
}

impl PaymentPipeline {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        payout: Arc<dyn PayoutSender>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        let settlement = SettlementEngine::new(store.clone(), payout, config.payout_timeout);
        Self {
            store,
            settlement,
            notifier,
            commission_sats: config.commission_sats,
            currency: config.payout_currency.clone(),
        }
    }

    pub fn store(&self) -> Arc<dyn PaymentStore> {
        self.store.clone()
    }

    pub fn settlement(&self) -> &SettlementEngine {
        &self.settlement
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    /// Applies one verified event.
    ///
    /// Ranking, activation and the idempotence key commit together; the
    /// payout runs after that commit and never undoes it.
    pub async fn process(&self, event: &WebhookEvent) -> Result<PipelineOutcome, ServiceError> {
        if !event.is_payment_settled() {
            tracing::info!("Ignoring webhook event {} of type {}", event.id, event.event_type);
            return Ok(PipelineOutcome::Ignored {
                event_type: event.event_type.clone(),
            });
        }

        let payer_id = event
            .payer_id()
            .ok_or_else(|| ServiceError::UnknownMetadata(event.id.clone()))?;

        self.store
            .get_user(payer_id)
            .await?
            .ok_or(ServiceError::UserNotFound(payer_id))?;

        let payment = NewPayment {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            payer_id,
            checkout_referral: event.checkout_referral(),
            commission_sats: self.commission_sats,
            currency: self.currency.clone(),
            paid_at: Utc::now(),
        };

        let commit = match self.store.commit_payment(&payment).await? {
            CommitOutcome::Applied(commit) => commit,
            CommitOutcome::Duplicate => {
                tracing::info!("Webhook event {} already processed, acknowledging", event.id);
                return Ok(PipelineOutcome::Duplicate {
                    event_id: event.id.clone(),
                });
            }
        };

        tracing::info!(
            "Payment {} applied: user {} {} entry, rank {} -> {}",
            event.id,
            payer_id,
            commit.entry.to_str(),
            commit.previous_rank,
            commit.payer.rank
        );

        let mut message = format!("Payment confirmed for {}.", commit.payer.display_name());
        let mut referrer_name = None;
        let mut commission_outcome = None;

        if let Some(referrer_id) = commit.entry.referrer_id() {
            match self.store.get_user(referrer_id).await {
                Ok(Some(referrer)) => {
                    message.push_str(&format!(" Commission owed to {}.", referrer.display_name()));
                    referrer_name = Some(referrer.display_name());

                    if let Some(commission) = &commit.commission {
                        let outcome = self
                            .settlement
                            .pay_commission(commission, &commit.payer, &referrer)
                            .await;
                        message.push(' ');
                        message.push_str(&describe_commission(&outcome));
                        commission_outcome = Some(outcome);
                    }
                }
                Ok(None) => {
                    tracing::warn!("Referrer {} of user {} not found", referrer_id, payer_id);
                    message.push_str(" Referrer not found, commission left pending.");
                }
                Err(e) => {
                    tracing::error!("Could not load referrer {}: {}", referrer_id, e);
                    message.push_str(" Referrer could not be loaded, commission left pending.");
                }
            }
        }

        notifier::dispatch(self.notifier.clone(), message.clone());

        Ok(PipelineOutcome::Processed(PaymentSummary {
            event_id: event.id.clone(),
            payer_id,
            entry: commit.entry,
            rank: commit.payer.rank,
            referrer_name,
            commission: commission_outcome,
            message,
        }))
    }
}
