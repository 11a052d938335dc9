//! Helpers shared by the exchange clients.

use crate::core::balance::ExchangeBalanceReport;
use crate::core::exchange::ExchangeError;
use anyhow::{Context, Result, anyhow};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const USER_AGENT: &str = concat!("xbal/", env!("CARGO_PKG_VERSION"));

/// Builds an HTTP client whose requests give up after `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Parses a numeric field that may be a string, a number, empty or null.
/// Anything unparseable is zero.
pub fn decimal_from_value(value: &Value) -> Decimal {
    let parsed = match value {
        Value::String(s) if !s.trim().is_empty() => {
            let s = s.trim();
            Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s)).ok()
        }
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        _ => None,
    };
    parsed.unwrap_or(Decimal::ZERO)
}

pub fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(decimal_from_value(&value))
}

/// Accepts strings and numbers (e.g. OKX `code`), anything else is empty.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// A non-empty string, anything else is `None`.
pub fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    })
}

/// A nested object that falls back to `T::default()` when it has the wrong type.
pub fn lenient_struct<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        debug!("Malformed nested object, treating as empty: {e}");
        T::default()
    }))
}

/// A list decoded one element at a time. Elements that fail to decode are
/// skipped, a non-list value is empty.
pub fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(decode_each(value, "response"))
}

fn decode_each<T: DeserializeOwned>(value: Value, exchange: &str) -> Vec<T> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Skipping malformed entry from {exchange}: {e}");
                    None
                }
            })
            .collect(),
        Value::Null => Vec::new(),
        _ => {
            warn!("Expected a list from {exchange}, treating as empty");
            Vec::new()
        }
    }
}

/// Decodes a top-level JSON list element by element.
pub fn parse_lenient_list<T: DeserializeOwned>(value: Value, exchange: &str) -> Vec<T> {
    decode_each(value, exchange)
}

/// Decodes a JSON payload into `T`, falling back to `T::default()` when the
/// top-level shape is unexpected. Field-level leniency comes from the
/// `lenient_*` deserializers on `T`.
pub fn parse_lenient<T: DeserializeOwned + Default>(value: Value, exchange: &str) -> T {
    match serde_json::from_value(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Unexpected response shape from {exchange}, treating as empty: {e}");
            T::default()
        }
    }
}

/// Reads a response body as JSON, turning non-2xx statuses into errors that
/// carry the exchange's own message when it sends one.
pub async fn read_json(response: reqwest::Response, exchange: &str) -> Result<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| anyhow!("Failed to read response from {exchange}: {e}"))?;
    debug!(%status, "Received {exchange} response");

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| {
                ["msg", "retMsg", "message"]
                    .iter()
                    .find_map(|field| body.get(field).and_then(Value::as_str).map(str::to_string))
            })
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        return Err(ExchangeError::Http {
            exchange: exchange.to_string(),
            status,
            message,
        }
        .into());
    }

    serde_json::from_str(&text)
        .map_err(|e| anyhow!("Failed to parse JSON response from {exchange}: {e}"))
}

/// Collapses a fetch result into a report; errors are logged and contained.
pub fn into_report(label: &str, result: Result<ExchangeBalanceReport>) -> ExchangeBalanceReport {
    match result {
        Ok(report) => report,
        Err(e) => {
            warn!("Error fetching {label} balance: {e:#}");
            ExchangeBalanceReport::failed(label, e.to_string())
        }
    }
}
