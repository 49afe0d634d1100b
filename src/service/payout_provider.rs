// service/payout_provider.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{config::Config, utils::currency::format_sats};

const COINBASE_API_VERSION: &str = "2025-08-18";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoutRequest {
    pub address: String,
    pub amount_sats: i64,
    pub currency: String,
    pub note: String,
    /// Lets the provider drop a repeated send for the same commission.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoutReceipt {
    pub transaction_id: String,
    pub status: String,
}

#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("Invalid payout address: {0}")]
    InvalidAddress(String),

    #[error("Payout rejected by provider ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Payout request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Payout timed out after {0:?}")]
    Timeout(Duration),

    #[error("Payout provider is not configured")]
    NotConfigured,
}

/// Sends crypto from the service wallet to a user wallet.
#[async_trait]
pub trait PayoutSender: Send + Sync {
    async fn send(&self, request: &PayoutRequest) -> Result<PayoutReceipt, PayoutError>;
}

/// Coinbase wallet "send money" API.
pub struct CoinbaseWalletPayout {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl CoinbaseWalletPayout {
    pub fn new(config: &Config) -> Result<Self, PayoutError> {
        let client = reqwest::Client::builder()
            .timeout(config.payout_timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: config.coinbase_api_url.trim_end_matches('/').to_string(),
            api_key: config.coinbase_wallet_api_key.clone(),
        })
    }
}

#[async_trait]
impl PayoutSender for CoinbaseWalletPayout {
    async fn send(&self, request: &PayoutRequest) -> Result<PayoutReceipt, PayoutError> {
        if self.api_key.is_empty() {
            return Err(PayoutError::NotConfigured);
        }

        let payload = serde_json::json!({
            "type": "send",
            "to": request.address,
            "amount": format_sats(request.amount_sats),
            "currency": request.currency,
            "description": request.note,
            "idem": request.idempotency_key,
        });

        let response = self
            .client
            .post(format!("{}/v2/accounts/primary/transactions", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("CB-VERSION", COINBASE_API_VERSION)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PayoutError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let response_body: serde_json::Value = response.json().await?;
        let data = &response_body["data"];

        // Without an id there is nothing to reconcile the payout against
        let transaction_id = match data["id"].as_str().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(PayoutError::Rejected {
                    status: status.as_u16(),
                    body: format!("response carried no transaction id: {}", response_body),
                })
            }
        };

        Ok(PayoutReceipt {
            transaction_id,
            status: data["status"].as_str().unwrap_or("pending").to_string(),
        })
    }
}
