use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    models::{
        paymentmodels::{Commission, ProcessedEvent},
        usermodel::User,
    },
    service::ranking::{plan_reposition, resolve_entry, RankEntry},
};

use super::{db::DBClient, userdb::USER_COLUMNS};

/// Key of the transaction-scoped advisory lock that serializes every rank
/// rewrite. Arbitrary, but must be the same for all writers.
pub const RANKING_LOCK_KEY: i64 = 0x6772_6164_7561;

/// A confirmed payment about to be applied.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub event_id: String,
    pub event_type: String,
    pub payer_id: Uuid,
    /// Referral applied at checkout, only used when the payer has none stored.
    pub checkout_referral: Option<Uuid>,
    pub commission_sats: i64,
    pub currency: String,
    pub paid_at: DateTime<Utc>,
}

/// State after the ranking transaction committed.
#[derive(Debug, Clone)]
pub struct PaymentCommit {
    pub payer: User,
    pub entry: RankEntry,
    pub previous_rank: i32,
    /// Commission created in `pending` state, if the payer is referred.
    pub commission: Option<Commission>,
}

#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Applied(PaymentCommit),
    /// The event id was already recorded; nothing was written.
    Duplicate,
}

#[async_trait]
pub trait PaymentExt {
    /// Records the event id, rewrites ranks, activates the subscription,
    /// stores a checkout referral and creates the pending commission, all in
    /// one transaction under the global ranking lock.
    async fn commit_payment(&self, payment: &NewPayment) -> Result<CommitOutcome, sqlx::Error>;

    async fn get_processed_event(
        &self,
        event_id: &str,
    ) -> Result<Option<ProcessedEvent>, sqlx::Error>;

    async fn get_commission(&self, event_id: &str) -> Result<Option<Commission>, sqlx::Error>;

    /// Moves a `pending` or `failed` commission to `in_flight` and counts the
    /// attempt. Returns `None` when it is paid or already being paid.
    async fn claim_commission(&self, event_id: &str) -> Result<Option<Commission>, sqlx::Error>;

    async fn mark_commission_paid(
        &self,
        event_id: &str,
        provider_reference: &str,
    ) -> Result<Commission, sqlx::Error>;

    async fn mark_commission_failed(
        &self,
        event_id: &str,
        error: &str,
    ) -> Result<Commission, sqlx::Error>;

    /// Unpaid commissions untouched for at least `idle_for`.
    async fn get_retryable_commissions(
        &self,
        max_attempts: i32,
        idle_for: Duration,
        limit: i64,
    ) -> Result<Vec<Commission>, sqlx::Error>;
}

#[async_trait]
impl PaymentExt for DBClient {
    async fn commit_payment(&self, payment: &NewPayment) -> Result<CommitOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(RANKING_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let payer = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(payment.payer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, event_type, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&payment.event_id)
        .bind(&payment.event_type)
        .bind(payment.payer_id)
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::Duplicate);
        }

        let checkout_referral = match payment.checkout_referral {
            Some(referrer_id) if payer.referral.is_none() => {
                let exists = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)",
                )
                .bind(referrer_id)
                .fetch_one(&mut *tx)
                .await?;
                exists.then_some(referrer_id)
            }
            _ => None,
        };

        let entry = resolve_entry(&payer, checkout_referral);

        let max_rank = sqlx::query_scalar::<_, i32>("SELECT COALESCE(MAX(rank), 0) FROM users")
            .fetch_one(&mut *tx)
            .await?;

        let plan = plan_reposition(&entry, payer.rank, max_rank);

        if let Some(shift) = plan.shift {
            sqlx::query(
                r#"
                UPDATE users
                SET rank = rank + $1, updated_at = NOW()
                WHERE rank BETWEEN $2 AND $3 AND id <> $4
                "#,
            )
            .bind(shift.delta)
            .bind(shift.from)
            .bind(shift.to)
            .bind(payer.id)
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET rank = $2,
                subscription_active = TRUE,
                subscription_since = $3,
                referral = COALESCE(referral, $4),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(payer.id)
        .bind(plan.new_rank)
        .bind(payment.paid_at)
        .bind(entry.new_referral_link())
        .fetch_one(&mut *tx)
        .await?;

        let commission = match entry.referrer_id() {
            Some(referrer_id) if payment.commission_sats > 0 => Some(
                sqlx::query_as::<_, Commission>(
                    r#"
                    INSERT INTO commissions
                    (event_id, payer_id, referrer_id, amount_sats, currency)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING *
                    "#,
                )
                .bind(&payment.event_id)
                .bind(payer.id)
                .bind(referrer_id)
                .bind(payment.commission_sats)
                .bind(&payment.currency)
                .fetch_one(&mut *tx)
                .await?,
            ),
            _ => None,
        };

        tx.commit().await?;

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
        sqlx::query_as::<_, ProcessedEvent>("SELECT * FROM processed_events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_commission(&self, event_id: &str) -> Result<Option<Commission>, sqlx::Error> {
        sqlx::query_as::<_, Commission>("SELECT * FROM commissions WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn claim_commission(&self, event_id: &str) -> Result<Option<Commission>, sqlx::Error> {
        sqlx::query_as::<_, Commission>(
            r#"
            UPDATE commissions
            SET status = 'in_flight', attempts = attempts + 1, updated_at = NOW()
            WHERE event_id = $1 AND status IN ('pending', 'failed')
            RETURNING *
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn mark_commission_paid(
        &self,
        event_id: &str,
        provider_reference: &str,
    ) -> Result<Commission, sqlx::Error> {
        sqlx::query_as::<_, Commission>(
            r#"
            UPDATE commissions
            SET status = 'paid',
                provider_reference = $2,
                last_error = NULL,
                paid_at = NOW(),
                updated_at = NOW()
            WHERE event_id = $1 AND status = 'in_flight'
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(provider_reference)
        .fetch_one(&self.pool)
        .await
    }

    async fn mark_commission_failed(
        &self,
        event_id: &str,
        error: &str,
    ) -> Result<Commission, sqlx::Error> {
        sqlx::query_as::<_, Commission>(
            r#"
            UPDATE commissions
            SET status = 'failed', last_error = $2, updated_at = NOW()
            WHERE event_id = $1 AND status = 'in_flight'
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_retryable_commissions(
        &self,
        max_attempts: i32,
        idle_for: Duration,
        limit: i64,
    ) -> Result<Vec<Commission>, sqlx::Error> {
        sqlx::query_as::<_, Commission>(
            r#"
            SELECT * FROM commissions
            WHERE status IN ('pending', 'failed')
            AND attempts < $1
            AND updated_at < $2
            ORDER BY created_at ASC
            LIMIT $3
            "#,
        )
        .bind(max_attempts)
        .bind(Utc::now() - idle_for)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
