/// Currency utility functions for handling bitcoin amounts
///
/// All amounts in the database are stored in satoshis (1 BTC = 100_000_000 sats)
/// to avoid floating-point precision issues.
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_traits::{Signed, ToPrimitive};

pub const SATS_PER_BTC: i64 = 100_000_000;

/// Parse a decimal BTC string (e.g. "0.0001") to satoshis
pub fn parse_btc_to_sats(amount_str: &str) -> Result<i64, String> {
    let amount = BigDecimal::from_str(amount_str.trim())
        .map_err(|_| "Invalid amount format".to_string())?;

    if amount.is_negative() {
        return Err("Amount cannot be negative".to_string());
    }

    let sats = amount * BigDecimal::from(SATS_PER_BTC);
    if !sats.is_integer() {
        return Err("Amount has more than 8 decimal places".to_string());
    }

    sats.to_i64().ok_or_else(|| "Amount is too large".to_string())
}

/// Satoshis as a plain 8-decimal BTC string, the format payout APIs expect
pub fn format_sats(sats: i64) -> String {
    let sign = if sats < 0 { "-" } else { "" };
    let abs = sats.unsigned_abs();
    let per_btc = SATS_PER_BTC as u64;
    format!("{}{}.{:08}", sign, abs / per_btc, abs % per_btc)
}

/// Format satoshis with a currency suffix for human-readable messages
pub fn format_sats_as_btc(sats: i64, currency: &str) -> String {
    format!("{} {}", format_sats(sats), currency)
}
