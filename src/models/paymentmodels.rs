use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "commission_status", rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    InFlight,
    Paid,
    Failed,
}

impl CommissionStatus {
    pub fn to_str(&self) -> &str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::InFlight => "in_flight",
            CommissionStatus::Paid => "paid",
            CommissionStatus::Failed => "failed",
        }
    }

    /// Statuses a settlement attempt may claim.
    pub fn is_claimable(&self) -> bool {
        matches!(self, CommissionStatus::Pending | CommissionStatus::Failed)
    }
}

/// Referral commission owed for one confirmed payment event.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Commission {
    pub event_id: String,
    pub payer_id: Uuid,
    pub referrer_id: Uuid,
    pub amount_sats: i64,
    pub currency: String,
    pub status: CommissionStatus,
    pub attempts: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_reference: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub event_type: String,
    pub user_id: Uuid,
    pub processed_at: DateTime<Utc>,
}
