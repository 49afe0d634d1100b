// In-memory store for pipeline and handler tests. Mirrors the Postgres
// implementation: one mutex plays the role of the advisory lock.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    models::{
        paymentmodels::{Commission, CommissionStatus, ProcessedEvent},
        usermodel::User,
    },
    service::ranking::{plan_reposition, resolve_entry},
};

use super::{
    paymentdb::{CommitOutcome, NewPayment, PaymentCommit, PaymentExt},
    userdb::UserExt,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    events: HashMap<String, ProcessedEvent>,
    commissions: HashMap<String, Commission>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_commits: AtomicBool,
}

pub fn test_user(first_name: &str, rank: i32, referral: Option<Uuid>) -> User {
    User {
        id: Uuid::new_v4(),
        first_name: first_name.to_string(),
        last_name: "Rossi".to_string(),
        email: format!("{}@example.com", first_name.to_lowercase()),
        wallet_address: "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".to_string(),
        subscription_active: rank > 0,
        subscription_since: None,
        referral,
        rank,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) -> User {
        self.state.lock().await.users.insert(user.id, user.clone());
        user
    }

    /// Makes every following `commit_payment` fail like a dropped connection.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub async fn user(&self, user_id: Uuid) -> User {
        self.state.lock().await.users[&user_id].clone()
    }

    pub async fn all_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.state.lock().await.users.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        users
    }

    pub async fn ranks(&self) -> Vec<i32> {
        self.state.lock().await.users.values().map(|u| u.rank).collect()
    }

    /// Ages a commission so the retry job considers it idle.
    pub async fn age_commission(&self, event_id: &str, by: Duration) {
        if let Some(c) = self.state.lock().await.commissions.get_mut(event_id) {
            c.updated_at = c.updated_at - by;
        }
    }
}

#[async_trait]
impl UserExt for MemoryStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn get_users_by_rank(&self) -> Result<Vec<User>, sqlx::Error> {
        let mut users: Vec<User> = self
            .state
            .lock()
            .await
            .users
            .values()
            .filter(|u| u.rank > 0)
            .cloned()
            .collect();
        users.sort_by_key(|u| u.rank);
        Ok(users)
    }
}

#[async_trait]
impl PaymentExt for MemoryStore {
    async fn commit_payment(&self, payment: &NewPayment) -> Result<CommitOutcome, sqlx::Error> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }

        let mut state = self.state.lock().await;

        let payer = state
            .users
            .get(&payment.payer_id)
            .cloned()
            .ok_or(sqlx::Error::RowNotFound)?;

        if state.events.contains_key(&payment.event_id) {
            return Ok(CommitOutcome::Duplicate);
        }

        let checkout_referral = payment
            .checkout_referral
            .filter(|id| payer.referral.is_none() && state.users.contains_key(id));
        let entry = resolve_entry(&payer, checkout_referral);

        let max_rank = state.users.values().map(|u| u.rank).max().unwrap_or(0);
        let plan = plan_reposition(&entry, payer.rank, max_rank);

        if let Some(shift) = plan.shift {
            for user in state.users.values_mut() {
                if user.id != payer.id && shift.applies_to(user.rank) {
                    user.rank += shift.delta;
                    user.updated_at = Utc::now();
                }
            }
        }

        let updated = {
            let user = state
                .users
                .get_mut(&payer.id)
                .ok_or(sqlx::Error::RowNotFound)?;
            user.rank = plan.new_rank;
            user.subscription_active = true;
            user.subscription_since = Some(payment.paid_at);
            if user.referral.is_none() {
                user.referral = entry.new_referral_link();
            }
            user.updated_at = Utc::now();
            user.clone()
        };

        state.events.insert(
            payment.event_id.clone(),
            ProcessedEvent {
                event_id: payment.event_id.clone(),
                event_type: payment.event_type.clone(),
                user_id: payer.id,
                processed_at: Utc::now(),
            },
        );

        let commission = match entry.referrer_id() {
            Some(referrer_id) if payment.commission_sats > 0 => {
                let now = Utc::now();
                let commission = Commission {
                    event_id: payment.event_id.clone(),
                    payer_id: payer.id,
                    referrer_id,
                    amount_sats: payment.commission_sats,
                    currency: payment.currency.clone(),
                    status: CommissionStatus::Pending,
                    attempts: 0,
                    provider_reference: None,
                    last_error: None,
                    created_at: now,
                    updated_at: now,
                    paid_at: None,
                };
                state
                    .commissions
                    .insert(payment.event_id.clone(), commission.clone());
                Some(commission)
            }
            _ => None,
        };

        Ok(CommitOutcome::Applied(PaymentCommit {
            payer: updated,
            entry,
            previous_rank: payer.rank,
            commission,
        }))
    }

    async fn get_processed_event(
        &self,
        event_id: &str,
    ) -> Result<Option<ProcessedEvent>, sqlx::Error> {
        Ok(self.state.lock().await.events.get(event_id).cloned())
    }

    async fn get_commission(&self, event_id: &str) -> Result<Option<Commission>, sqlx::Error> {
        Ok(self.state.lock().await.commissions.get(event_id).cloned())
    }

    async fn claim_commission(&self, event_id: &str) -> Result<Option<Commission>, sqlx::Error> {
        let mut state = self.state.lock().await;
        match state.commissions.get_mut(event_id) {
            Some(c) if c.status.is_claimable() => {
                c.status = CommissionStatus::InFlight;
                c.attempts += 1;
                c.updated_at = Utc::now();
                Ok(Some(c.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_commission_paid(
        &self,
        event_id: &str,
        provider_reference: &str,
    ) -> Result<Commission, sqlx::Error> {
        let mut state = self.state.lock().await;
        let c = state
            .commissions
            .get_mut(event_id)
            .filter(|c| c.status == CommissionStatus::InFlight)
            .ok_or(sqlx::Error::RowNotFound)?;
        c.status = CommissionStatus::Paid;
        c.provider_reference = Some(provider_reference.to_string());
        c.last_error = None;
        c.paid_at = Some(Utc::now());
        c.updated_at = Utc::now();
        Ok(c.clone())
    }

    async fn mark_commission_failed(
        &self,
        event_id: &str,
        error: &str,
    ) -> Result<Commission, sqlx::Error> {
        let mut state = self.state.lock().await;
        let c = state
            .commissions
            .get_mut(event_id)
            .filter(|c| c.status == CommissionStatus::InFlight)
            .ok_or(sqlx::Error::RowNotFound)?;
        c.status = CommissionStatus::Failed;
        c.last_error = Some(error.to_string());
        c.updated_at = Utc::now();
        Ok(c.clone())
    }

    async fn get_retryable_commissions(
        &self,
        max_attempts: i32,
        idle_for: Duration,
        limit: i64,
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let cutoff = Utc::now() - idle_for;
        let mut due: Vec<Commission> = self
            .state
            .lock()
            .await
            .commissions
            .values()
            .filter(|c| c.status.is_claimable() && c.attempts < max_attempts && c.updated_at < cutoff)
            .cloned()
            .collect();
        due.sort_by_key(|c| c.created_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }
}
