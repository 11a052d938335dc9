//! Append-only balance history, read back at daily granularity.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// One recorded observation of the total and its per-exchange split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_usd: Decimal,
    pub per_exchange: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeEntry {
    pub exchange: String,
    pub balance: Decimal,
}

/// Persisted shape of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub total_balance: Decimal,
    #[serde(default)]
    pub exchanges: Vec<ExchangeEntry>,
}

impl From<&BalanceSnapshot> for HistoryRecord {
    fn from(snapshot: &BalanceSnapshot) -> Self {
        HistoryRecord {
            timestamp: snapshot.timestamp,
            total_balance: snapshot.total_usd,
            exchanges: snapshot
                .per_exchange
                .iter()
                .map(|(exchange, balance)| ExchangeEntry {
                    exchange: exchange.clone(),
                    balance: *balance,
                })
                .collect(),
        }
    }
}

impl From<HistoryRecord> for BalanceSnapshot {
    fn from(record: HistoryRecord) -> Self {
        BalanceSnapshot {
            timestamp: record.timestamp,
            total_usd: record.total_balance,
            per_exchange: record
                .exchanges
                .into_iter()
                .map(|e| (e.exchange, e.balance))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeRange {
    Week,
    #[default]
    Month,
    Quarter,
    Year,
    All,
}

impl TimeRange {
    /// Lookback window, `None` meaning all time.
    pub fn to_duration(&self) -> Option<Duration> {
        match self {
            TimeRange::Week => Some(Duration::days(7)),
            TimeRange::Month => Some(Duration::days(30)),
            TimeRange::Quarter => Some(Duration::days(90)),
            TimeRange::Year => Some(Duration::days(365)),
            TimeRange::All => None,
        }
    }

    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.to_duration().map(|d| now - d)
    }
}

impl Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                TimeRange::Week => "7d",
                TimeRange::Month => "30d",
                TimeRange::Quarter => "90d",
                TimeRange::Year => "1y",
                TimeRange::All => "all",
            }
        )
    }
}

impl FromStr for TimeRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "7d" | "week" => Ok(TimeRange::Week),
            "30d" | "month" => Ok(TimeRange::Month),
            "90d" | "quarter" => Ok(TimeRange::Quarter),
            "1y" | "year" => Ok(TimeRange::Year),
            "all" => Ok(TimeRange::All),
            _ => Err(anyhow::anyhow!("Invalid time range: {}", s)),
        }
    }
}

/// Durable snapshot persistence port.
pub trait HistoryBackend: Send + Sync {
    fn append(&self, snapshot: &BalanceSnapshot) -> Result<()>;

    /// Every snapshot at or after `from` (all of them for `None`), in any order.
    fn since(&self, from: Option<DateTime<Utc>>) -> Result<Vec<BalanceSnapshot>>;

    /// Deletes snapshots strictly before `cutoff`, returning how many were removed.
    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Keeps the latest snapshot of each UTC calendar day, sorted ascending.
pub fn consolidate_daily(snapshots: Vec<BalanceSnapshot>) -> Vec<BalanceSnapshot> {
    let mut by_day: BTreeMap<NaiveDate, BalanceSnapshot> = BTreeMap::new();
    for snapshot in snapshots {
        let day = snapshot.timestamp.date_naive();
        match by_day.get(&day) {
            Some(existing) if existing.timestamp > snapshot.timestamp => {}
            _ => {
                by_day.insert(day, snapshot);
            }
        }
    }
    by_day.into_values().collect()
}

pub struct HistoryStore {
    backend: Arc<dyn HistoryBackend>,
    write_lock: Mutex<()>,
    default_range: TimeRange,
    retention: Option<Duration>,
}

impl HistoryStore {
    pub fn new(backend: Arc<dyn HistoryBackend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
            default_range: TimeRange::default(),
            retention: None,
        }
    }

    /// Drops snapshots older than `days` on every save.
    pub fn with_retention_days(mut self, days: Option<u32>) -> Self {
        self.retention = days.map(|d| Duration::days(i64::from(d)));
        self
    }

    pub fn with_default_range(mut self, range: TimeRange) -> Self {
        self.default_range = range;
        self
    }

    /// Appends a snapshot stamped now and returns the default-range history.
    pub fn save_snapshot(
        &self,
        total_usd: Decimal,
        per_exchange: BTreeMap<String, Decimal>,
    ) -> Result<Vec<BalanceSnapshot>> {
        self.save_snapshot_at(Utc::now(), total_usd, per_exchange)
    }

    pub fn save_snapshot_at(
        &self,
        now: DateTime<Utc>,
        total_usd: Decimal,
        per_exchange: BTreeMap<String, Decimal>,
    ) -> Result<Vec<BalanceSnapshot>> {
        let snapshot = BalanceSnapshot {
            timestamp: now,
            total_usd,
            per_exchange,
        };
        {
            let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.backend.append(&snapshot)?;
            info!("Recorded balance snapshot of {} USD", snapshot.total_usd);

            if let Some(retention) = self.retention {
                let removed = self.backend.prune_before(now - retention)?;
                if removed > 0 {
                    debug!("Pruned {removed} snapshots past retention");
                }
            }
        }
        self.get_history_at(self.default_range, now)
    }

    pub fn get_history(&self, range: TimeRange) -> Result<Vec<BalanceSnapshot>> {
        self.get_history_at(range, Utc::now())
    }

    /// One snapshot per calendar day within `range` of `now`, ascending.
    pub fn get_history_at(
        &self,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<Vec<BalanceSnapshot>> {
        let raw = self.backend.since(range.start(now))?;
        debug!("Fetched {} raw snapshots for range {range}", raw.len());
        Ok(consolidate_daily(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryHistoryBackend;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn snapshot(ts: DateTime<Utc>, total: Decimal) -> BalanceSnapshot {
        BalanceSnapshot {
            timestamp: ts,
            total_usd: total,
            per_exchange: BTreeMap::new(),
        }
    }

    #[test]
    fn test_same_day_latest_wins() {
        let out = consolidate_daily(vec![
            snapshot(at(5, 9), dec!(100)),
            snapshot(at(5, 18), dec!(150)),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].total_usd, dec!(150));

        // Input order does not matter
        let out = consolidate_daily(vec![
            snapshot(at(5, 18), dec!(150)),
            snapshot(at(5, 9), dec!(100)),
        ]);
        assert_eq!(out[0].total_usd, dec!(150));
    }

    #[test]
    fn test_consolidation_sorts_ascending() {
        let out = consolidate_daily(vec![
            snapshot(at(7, 1), dec!(3)),
            snapshot(at(5, 1), dec!(1)),
            snapshot(at(6, 1), dec!(2)),
            snapshot(at(6, 23), dec!(2.5)),
        ]);
        let totals: Vec<_> = out.iter().map(|s| s.total_usd).collect();
        assert_eq!(totals, vec![dec!(1), dec!(2.5), dec!(3)]);
        assert!(out.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_save_and_range_filter() {
        let store = HistoryStore::new(Arc::new(MemoryHistoryBackend::new()));
        let now = at(20, 12);

        store
            .save_snapshot_at(now - Duration::days(40), dec!(500), BTreeMap::new())
            .unwrap();
        store
            .save_snapshot_at(now - Duration::days(3), dec!(800), BTreeMap::new())
            .unwrap();
        let mut breakdown = BTreeMap::new();
        breakdown.insert("OKX".to_string(), dec!(600));
        breakdown.insert("Cash".to_string(), dec!(400));
        let history = store.save_snapshot_at(now, dec!(1000), breakdown).unwrap();

        // Default range is 30 days
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].per_exchange["OKX"], dec!(600));

        assert_eq!(store.get_history_at(TimeRange::Week, now).unwrap().len(), 2);
        assert_eq!(store.get_history_at(TimeRange::All, now).unwrap().len(), 3);
    }

    #[test]
    fn test_retention_prunes_old_snapshots() {
        let store = HistoryStore::new(Arc::new(MemoryHistoryBackend::new()))
            .with_retention_days(Some(10));
        let now = at(20, 12);
        store
            .save_snapshot_at(now - Duration::days(15), dec!(1), BTreeMap::new())
            .unwrap();
        store.save_snapshot_at(now, dec!(2), BTreeMap::new()).unwrap();

        let all = store.get_history_at(TimeRange::All, now).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].total_usd, dec!(2));
    }

    #[test]
    fn test_record_conversion_keeps_breakdown() {
        let mut per_exchange = BTreeMap::new();
        per_exchange.insert("Bybit".to_string(), dec!(12.5));
        let snap = BalanceSnapshot {
            timestamp: at(1, 0),
            total_usd: dec!(12.5),
            per_exchange,
        };
        let record = HistoryRecord::from(&snap);
        assert_eq!(record.exchanges[0].exchange, "Bybit");
        assert_eq!(BalanceSnapshot::from(record), snap);
    }

    #[test]
    fn test_time_range_parse() {
        assert_eq!("7D".parse::<TimeRange>().unwrap(), TimeRange::Week);
        assert_eq!("all".parse::<TimeRange>().unwrap(), TimeRange::All);
        assert!("2w".parse::<TimeRange>().is_err());
        assert_eq!(TimeRange::Year.to_string(), "1y");
        assert!(TimeRange::All.start(at(1, 0)).is_none());
    }
}
