// service/settlement.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::{
    db::{paymentdb::PaymentExt, PaymentStore},
    models::{paymentmodels::Commission, usermodel::User},
    service::{
        error::ServiceError,
        payout_provider::{PayoutError, PayoutReceipt, PayoutRequest, PayoutSender},
    },
    utils::{currency::format_sats_as_btc, wallet_address::is_valid_bitcoin_address},
};

/// Result of one commission settlement attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CommissionOutcome {
    Paid { provider_reference: String },
    /// Nothing marked as paid; the commission stays eligible for retry.
    Failed { reason: String },
    /// Paid already, or another attempt holds it.
    Skipped,
}

impl CommissionOutcome {
    pub fn is_paid(&self) -> bool {
        matches!(self, CommissionOutcome::Paid { .. })
    }
}

#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<dyn PaymentStore>,
    payout: Arc<dyn PayoutSender>,
    payout_timeout: Duration,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        payout: Arc<dyn PayoutSender>,
        payout_timeout: Duration,
    ) -> Self {
        Self {
            store,
            payout,
            payout_timeout,
        }
    }

    /// Claims the commission and tries exactly one payout.
    ///
    /// Never fails: store and provider errors end up in the outcome and the
    /// log. Runs outside the ranking transaction.
    pub async fn pay_commission(
        &self,
        commission: &Commission,
        payer: &User,
        referrer: &User,
    ) -> CommissionOutcome {
        let claimed = match self.store.claim_commission(&commission.event_id).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                tracing::info!(
                    "Commission for event {} already settled or in flight, skipping",
                    commission.event_id
                );
                return CommissionOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(
                    "Could not claim commission for event {}: {}",
                    commission.event_id,
                    e
                );
                return CommissionOutcome::Failed {
                    reason: format!("commission could not be claimed: {}", e),
                };
            }
        };

        let result = self.send_payout(&claimed, payer, referrer).await;

        match result {
            Ok(receipt) => {
                let provider_reference = receipt.transaction_id;
                if let Err(e) = self
                    .store
                    .mark_commission_paid(&claimed.event_id, &provider_reference)
                    .await
                {
                    // Money left the wallet: keep the row in_flight so no
                    // retry sends it twice.
                    tracing::error!(
                        "Commission for event {} paid ({}) but not recorded: {}",
                        claimed.event_id,
                        provider_reference,
                        e
                    );
                }
                tracing::info!(
                    "Referral commission of {} paid to user {} for event {} ({}, provider status {})",
                    format_sats_as_btc(claimed.amount_sats, &claimed.currency),
                    referrer.id,
                    claimed.event_id,
                    provider_reference,
                    receipt.status
                );
                CommissionOutcome::Paid { provider_reference }
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(
                    "Referral commission for event {} failed (attempt {}): {}",
                    claimed.event_id,
                    claimed.attempts,
                    reason
                );
                if let Err(db_err) = self
                    .store
                    .mark_commission_failed(&claimed.event_id, &reason)
                    .await
                {
                    tracing::error!(
                        "Could not record failed commission for event {}: {}",
                        claimed.event_id,
                        db_err
                    );
                }
                CommissionOutcome::Failed { reason }
            }
        }
    }

    /// Loads payer and referrer, then settles. Used by the retry job.
    pub async fn retry_commission(
        &self,
        commission: &Commission,
    ) -> Result<(User, User, CommissionOutcome), ServiceError> {
        let payer = self
            .store
            .get_user(commission.payer_id)
            .await?
            .ok_or(ServiceError::UserNotFound(commission.payer_id))?;
        let referrer = self
            .store
            .get_user(commission.referrer_id)
            .await?
            .ok_or(ServiceError::UserNotFound(commission.referrer_id))?;

        let outcome = self.pay_commission(commission, &payer, &referrer).await;
        Ok((payer, referrer, outcome))
    }

    async fn send_payout(
        &self,
        commission: &Commission,
        payer: &User,
        referrer: &User,
    ) -> Result<PayoutReceipt, PayoutError> {
        let address = referrer.wallet_address.trim();
        let address_ok = if commission.currency.eq_ignore_ascii_case("BTC") {
            is_valid_bitcoin_address(address)
        } else {
            !address.is_empty()
        };
        if !address_ok {
            return Err(PayoutError::InvalidAddress(address.to_string()));
        }

        let request = PayoutRequest {
            address: address.to_string(),
            amount_sats: commission.amount_sats,
            currency: commission.currency.clone(),
            note: format!("Referral from {}", payer.first_name),
            idempotency_key: commission.event_id.clone(),
        };

        match timeout(self.payout_timeout, self.payout.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(PayoutError::Timeout(self.payout_timeout)),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub enum FakeBehaviour {
        Succeed,
        Reject,
        Hang,
    }

    /// Records requests and answers as configured.
    pub struct FakePayout {
        pub behaviour: Mutex<FakeBehaviour>,
        pub requests: Mutex<Vec<PayoutRequest>>,
    }

    impl FakePayout {
        pub fn new(behaviour: FakeBehaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour: Mutex::new(behaviour),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn set(&self, behaviour: FakeBehaviour) {
            *self.behaviour.lock().unwrap() = behaviour;
        }

        pub fn sent(&self) -> Vec<PayoutRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PayoutSender for FakePayout {
        async fn send(&self, request: &PayoutRequest) -> Result<PayoutReceipt, PayoutError> {
            self.requests.lock().unwrap().push(request.clone());
            match *self.behaviour.lock().unwrap() {
                FakeBehaviour::Succeed => {
                    return Ok(PayoutReceipt {
                        transaction_id: format!("tx_{}", request.idempotency_key),
                        status: "completed".to_string(),
                    })
                }
                FakeBehaviour::Reject => {
                    return Err(PayoutError::Rejected {
                        status: 422,
                        body: "insufficient funds".to_string(),
                    })
                }
                FakeBehaviour::Hang => {}
            }
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(PayoutError::NotConfigured)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeBehaviour, FakePayout};
    use super::*;
    use crate::db::{
        memory::{test_user, MemoryStore},
        paymentdb::{CommitOutcome, NewPayment},
    };
    use crate::models::paymentmodels::CommissionStatus;
    use chrono::Utc;

    async fn pending_commission(store: &MemoryStore, referrer: &User) -> (User, Commission) {
        let payer = store
            .insert_user(test_user("Carla", 0, Some(referrer.id)))
            .await;
        let outcome = store
            .commit_payment(&NewPayment {
                event_id: "evt_c".to_string(),
                event_type: "charge:confirmed".to_string(),
                payer_id: payer.id,
                checkout_referral: None,
                commission_sats: 10_000,
                currency: "BTC".to_string(),
                paid_at: Utc::now(),
            })
            .await
            .unwrap();
        match outcome {
            CommitOutcome::Applied(commit) => (commit.payer, commit.commission.unwrap()),
            CommitOutcome::Duplicate => panic!("fresh event reported as duplicate"),
        }
    }

    fn engine(store: Arc<MemoryStore>, payout: Arc<FakePayout>) -> SettlementEngine {
        SettlementEngine::new(store, payout, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_successful_payout_is_recorded_once() {
        let store = Arc::new(MemoryStore::new());
        let referrer = store.insert_user(test_user("Anna", 1, None)).await;
        let (payer, commission) = pending_commission(&store, &referrer).await;
        let payout = FakePayout::new(FakeBehaviour::Succeed);
        let engine = engine(store.clone(), payout.clone());

        let outcome = engine.pay_commission(&commission, &payer, &referrer).await;
        assert_eq!(
            outcome,
            CommissionOutcome::Paid {
                provider_reference: "tx_evt_c".to_string()
            }
        );

        // Second attempt finds it settled
        let again = engine.pay_commission(&commission, &payer, &referrer).await;
        assert_eq!(again, CommissionOutcome::Skipped);
        assert_eq!(payout.sent().len(), 1);
        assert_eq!(payout.sent()[0].address, referrer.wallet_address);
        assert_eq!(payout.sent()[0].note, "Referral from Carla");

        let stored = store.get_commission("evt_c").await.unwrap().unwrap();
        assert_eq!(stored.status, CommissionStatus::Paid);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_rejected_payout_stays_retryable() {
        let store = Arc::new(MemoryStore::new());
        let referrer = store.insert_user(test_user("Anna", 1, None)).await;
        let (payer, commission) = pending_commission(&store, &referrer).await;
        let payout = FakePayout::new(FakeBehaviour::Reject);
        let engine = engine(store.clone(), payout.clone());

        let outcome = engine.pay_commission(&commission, &payer, &referrer).await;
        assert!(matches!(outcome, CommissionOutcome::Failed { ref reason } if reason.contains("insufficient funds")));

        let stored = store.get_commission("evt_c").await.unwrap().unwrap();
        assert_eq!(stored.status, CommissionStatus::Failed);
        assert!(stored.last_error.unwrap().contains("422"));

        // A later retry succeeds
        payout.set(FakeBehaviour::Succeed);
        assert!(engine.pay_commission(&commission, &payer, &referrer).await.is_paid());
        let stored = store.get_commission("evt_c").await.unwrap().unwrap();
        assert_eq!(stored.status, CommissionStatus::Paid);
        assert_eq!(stored.attempts, 2);
    }

    #[tokio::test]
    async fn test_hanging_provider_times_out() {
        let store = Arc::new(MemoryStore::new());
        let referrer = store.insert_user(test_user("Anna", 1, None)).await;
        let (payer, commission) = pending_commission(&store, &referrer).await;
        let engine = engine(store.clone(), FakePayout::new(FakeBehaviour::Hang));

        let outcome = engine.pay_commission(&commission, &payer, &referrer).await;
        assert!(matches!(outcome, CommissionOutcome::Failed { ref reason } if reason.contains("timed out")));
        assert_eq!(
            store.get_commission("evt_c").await.unwrap().unwrap().status,
            CommissionStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_invalid_wallet_never_reaches_provider() {
        let store = Arc::new(MemoryStore::new());
        let mut broke = test_user("Anna", 1, None);
        broke.wallet_address = "   ".to_string();
        let referrer = store.insert_user(broke).await;
        let (payer, commission) = pending_commission(&store, &referrer).await;
        let payout = FakePayout::new(FakeBehaviour::Succeed);
        let engine = engine(store.clone(), payout.clone());

        let outcome = engine.pay_commission(&commission, &payer, &referrer).await;
        assert!(matches!(outcome, CommissionOutcome::Failed { ref reason } if reason.contains("Invalid payout address")));
        assert!(payout.sent().is_empty());
    }
}
