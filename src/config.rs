// config.rs
use std::time::Duration;

use anyhow::{anyhow, Context};

use crate::utils::currency::parse_btc_to_sats;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    // Payment processor webhook
    pub webhook_secret: String,
    // Payout provider
    pub coinbase_api_url: String,
    pub coinbase_wallet_api_key: String,
    pub commission_sats: i64,
    pub payout_currency: String,
    pub payout_timeout: Duration,
    // Chat notifications
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    // Commission retry job, zero interval disables it
    pub commission_retry_interval: Duration,
    pub commission_max_attempts: i32,
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("{} has an invalid value {:?}: {}", name, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    pub fn init() -> anyhow::Result<Config> {
        let database_url = optional_var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let webhook_secret = optional_var("COINBASE_WEBHOOK_SECRET")
            .context("COINBASE_WEBHOOK_SECRET must be set")?;

        let commission_btc =
            optional_var("REFERRAL_COMMISSION_BTC").unwrap_or_else(|| "0.0001".to_string());
        let commission_sats = parse_btc_to_sats(&commission_btc)
            .map_err(|e| anyhow!("REFERRAL_COMMISSION_BTC {:?}: {}", commission_btc, e))?;

        let commission_max_attempts: i32 = parsed_var("COMMISSION_MAX_ATTEMPTS", 5)?;
        if commission_max_attempts < 1 {
            return Err(anyhow!("COMMISSION_MAX_ATTEMPTS must be at least 1"));
        }

        Ok(Config {
            database_url,
            port: parsed_var("PORT", 8000)?,
            webhook_secret,
            coinbase_api_url: optional_var("COINBASE_API_URL")
                .unwrap_or_else(|| "https://api.coinbase.com".to_string()),
            coinbase_wallet_api_key: optional_var("COINBASE_WALLET_API_KEY").unwrap_or_default(),
            commission_sats,
            payout_currency: optional_var("PAYOUT_CURRENCY")
                .unwrap_or_else(|| "BTC".to_string())
                .to_uppercase(),
            payout_timeout: Duration::from_secs(parsed_var("PAYOUT_TIMEOUT_SECS", 20)?),
            telegram_token: optional_var("TELEGRAM_TOKEN"),
            telegram_chat_id: optional_var("TELEGRAM_CHAT_ID"),
            commission_retry_interval: Duration::from_secs(parsed_var(
                "COMMISSION_RETRY_INTERVAL_SECS",
                900,
            )?),
            commission_max_attempts,
        })
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    pub fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/graduatoria_test".to_string(),
            port: 0,
            webhook_secret: "whsec_test".to_string(),
            coinbase_api_url: "http://127.0.0.1:9".to_string(),
            coinbase_wallet_api_key: String::new(),
            commission_sats: 10_000,
            payout_currency: "BTC".to_string(),
            payout_timeout: Duration::from_millis(200),
            telegram_token: None,
            telegram_chat_id: None,
            commission_retry_interval: Duration::from_secs(0),
            commission_max_attempts: 3,
        }
    }
}
