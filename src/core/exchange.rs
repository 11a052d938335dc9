//! Exchange kinds, account slots and the client abstraction.

use crate::core::balance::ExchangeBalanceReport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Bybit,
    Binance,
    Okx,
}

impl Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ExchangeKind::Bybit => "Bybit",
                ExchangeKind::Binance => "Binance",
                ExchangeKind::Okx => "OKX",
            }
        )
    }
}

impl FromStr for ExchangeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bybit" => Ok(ExchangeKind::Bybit),
            "binance" => Ok(ExchangeKind::Binance),
            "okx" => Ok(ExchangeKind::Okx),
            _ => Err(anyhow::anyhow!("Unsupported exchange: {}", s)),
        }
    }
}

/// One credential slot on one exchange. Bybit and Binance have a single
/// slot, OKX can hold several accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "exchange", rename_all = "lowercase")]
pub enum ExchangeAccount {
    Bybit,
    Binance,
    Okx {
        #[serde(default)]
        slot: usize,
    },
}

impl ExchangeAccount {
    pub fn kind(&self) -> ExchangeKind {
        match self {
            ExchangeAccount::Bybit => ExchangeKind::Bybit,
            ExchangeAccount::Binance => ExchangeKind::Binance,
            ExchangeAccount::Okx { .. } => ExchangeKind::Okx,
        }
    }

    /// Label used when the configuration does not name the account.
    pub fn default_label(&self) -> String {
        match self {
            ExchangeAccount::Okx { slot } if *slot > 0 => format!("OKX {}", slot + 1),
            other => other.kind().to_string(),
        }
    }
}

/// Failures contained inside a single exchange report.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("{0} API credentials not set")]
    MissingCredentials(String),
    #[error("HTTP error: {status} from {exchange}: {message}")]
    Http {
        exchange: String,
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("{exchange} rejected the request: {message}")]
    Rejected { exchange: String, message: String },
}

/// Fetches and normalizes the balance of one exchange account.
///
/// Implementations never fail: every error ends up in the report.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn label(&self) -> &str;

    async fn get_balance(&self) -> ExchangeBalanceReport;
}
