//! Rolling change metrics over the balance history.
use crate::core::history::BalanceSnapshot;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricWindow {
    pub change: Decimal,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub daily: MetricWindow,
    pub weekly: MetricWindow,
    pub monthly: MetricWindow,
}

/// Absolute and percentage change. A zero `previous`, or a result outside
/// the `Decimal` range, yields zero for both.
pub fn calculate_change(current: Decimal, previous: Decimal) -> MetricWindow {
    if previous.is_zero() {
        return MetricWindow::default();
    }
    current
        .checked_sub(previous)
        .and_then(|change| {
            let percentage = change
                .checked_div(previous)?
                .checked_mul(Decimal::ONE_HUNDRED)?;
            Some(MetricWindow { change, percentage })
        })
        .unwrap_or_default()
}

/// The snapshot closest to `target`; on equal distance the earlier entry wins.
pub fn find_closest(history: &[BalanceSnapshot], target: DateTime<Utc>) -> Option<&BalanceSnapshot> {
    history
        .iter()
        .min_by_key(|s| (s.timestamp - target).num_milliseconds().unsigned_abs())
}

pub fn get_metrics(history: &[BalanceSnapshot]) -> Option<Metrics> {
    get_metrics_at(history, Utc::now())
}

/// 24h, 7d and 30d change of the latest snapshot. `None` on empty history.
pub fn get_metrics_at(history: &[BalanceSnapshot], now: DateTime<Utc>) -> Option<Metrics> {
    let current = history.iter().max_by_key(|s| s.timestamp)?;

    let window = |lookback: Duration| {
        find_closest(history, now - lookback)
            .map(|prior| calculate_change(current.total_usd, prior.total_usd))
            .unwrap_or_default()
    };

    Some(Metrics {
        daily: window(Duration::hours(24)),
        weekly: window(Duration::hours(24 * 7)),
        monthly: window(Duration::hours(24 * 30)),
    })
}
