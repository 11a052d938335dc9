//! Normalized balance types shared by every exchange client.
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Assets valued 1:1 against USD.
pub const USD_STABLECOINS: [&str; 6] = ["USD", "USDT", "USDC", "BUSD", "FDUSD", "DAI"];

pub fn is_usd_stablecoin(asset: &str) -> bool {
    USD_STABLECOINS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(asset))
}

/// A single non-zero asset holding on one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
    pub total: Decimal,
}

impl AssetBalance {
    /// Builds a balance from the total and the locked portion. `locked` is
    /// clamped into `[0, total]` so `free + locked == total` always holds.
    /// Returns `None` for non-positive totals.
    pub fn new(asset: impl Into<String>, total: Decimal, locked: Decimal) -> Option<Self> {
        if total <= Decimal::ZERO {
            return None;
        }
        let locked = locked.clamp(Decimal::ZERO, total);
        Some(Self {
            asset: asset.into(),
            free: total - locked,
            locked,
            total,
        })
    }
}

/// Outcome of fetching one account: either balances and a USD total, or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeBalanceReport {
    pub exchange: String,
    pub balances: Vec<AssetBalance>,
    pub total_usd: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExchangeBalanceReport {
    pub fn ok(exchange: impl Into<String>, balances: Vec<AssetBalance>, total_usd: Decimal) -> Self {
        Self {
            exchange: exchange.into(),
            balances,
            total_usd,
            error: None,
        }
    }

    pub fn failed(exchange: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            balances: Vec::new(),
            total_usd: Decimal::ZERO,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Picks the USD value of a holding.
///
/// Stablecoins count 1:1, then the exchange's own valuation, then
/// `total * price` from a `<ASSET>USDT` ticker map.
pub fn usd_value(
    asset: &str,
    total: Decimal,
    reported_usd: Option<Decimal>,
    prices: Option<&HashMap<String, Decimal>>,
) -> Decimal {
    if is_usd_stablecoin(asset) {
        return total;
    }
    if let Some(reported) = reported_usd.filter(|v| !v.is_zero()) {
        return reported;
    }
    match prices.and_then(|p| p.get(&format!("{}USDT", asset.to_uppercase()))) {
        Some(price) => total * price,
        None => {
            tracing::debug!("No USD valuation available for {asset}");
            Decimal::ZERO
        }
    }
}

/// Sum of `total_usd` across reports. Errored reports contribute zero.
pub fn total_usd(reports: &[ExchangeBalanceReport]) -> Decimal {
    reports.iter().map(|r| r.total_usd).sum()
}

/// Label to USD breakdown, as recorded in history snapshots.
pub fn per_exchange_usd(reports: &[ExchangeBalanceReport]) -> BTreeMap<String, Decimal> {
    reports
        .iter()
        .map(|r| (r.exchange.clone(), r.total_usd))
        .collect()
}
