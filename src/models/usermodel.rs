use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,

    /// Payout destination for referral commissions
    pub wallet_address: String,
    pub subscription_active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_since: Option<DateTime<Utc>>,

    /// Referring user, one level deep. Never rewritten once set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral: Option<Uuid>,

    /// Position in the graduatoria, 1 is the top. 0 means never ranked.
    pub rank: i32,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
