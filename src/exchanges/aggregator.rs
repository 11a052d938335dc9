//! Concurrent fan-out over every configured account plus the cash entry.

use super::build_client;
use crate::core::balance::{AssetBalance, ExchangeBalanceReport};
use crate::core::config::{AppConfig, CashConfig};
use crate::core::credentials::CredentialStore;
use crate::core::exchange::ExchangeClient;
use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct BalanceAggregator {
    clients: Vec<Arc<dyn ExchangeClient>>,
    cash: CashConfig,
}

impl BalanceAggregator {
    pub fn new(clients: Vec<Arc<dyn ExchangeClient>>, cash: CashConfig) -> Self {
        Self { clients, cash }
    }

    /// One client per configured account, in declaration order.
    pub fn from_config(config: &AppConfig, credentials: Arc<CredentialStore>) -> Result<Self> {
        let clients = config
            .accounts
            .iter()
            .map(|account| build_client(account, config, Arc::clone(&credentials)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(clients, config.cash.clone()))
    }

    /// Labels in output order, cash entry last.
    pub fn labels(&self) -> Vec<String> {
        self.clients
            .iter()
            .map(|c| c.label().to_string())
            .chain(std::iter::once(self.cash.label.clone()))
            .collect()
    }

    /// Fetches every account concurrently. The output follows declaration
    /// order regardless of completion order and always ends with the cash entry.
    pub async fn get_all_balances(&self) -> Vec<ExchangeBalanceReport> {
        let (labels, tasks): (Vec<_>, Vec<_>) = self
            .clients
            .iter()
            .map(|client| {
                let client = Arc::clone(client);
                let label = client.label().to_string();
                (label, tokio::spawn(async move { client.get_balance().await }))
            })
            .unzip();
        debug!("Spawned {} balance fetches", tasks.len());

        let mut reports: Vec<ExchangeBalanceReport> = labels
            .into_iter()
            .zip(join_all(tasks).await)
            .map(|(label, joined)| match joined {
                Ok(report) => report,
                Err(e) => {
                    warn!("Balance task for {label} did not complete: {e}");
                    ExchangeBalanceReport::failed(label, format!("Balance task failed: {e}"))
                }
            })
            .collect();

        reports.push(self.cash_report());
        reports
    }

    /// The fixed manual ledger entry. Never errors.
    pub fn cash_report(&self) -> ExchangeBalanceReport {
        let balances = AssetBalance::new(&self.cash.asset, self.cash.value_usd, Default::default())
            .into_iter()
            .collect::<Vec<_>>();
        let total_usd = balances.first().map(|b| b.total).unwrap_or_default();
        ExchangeBalanceReport::ok(&self.cash.label, balances, total_usd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct StubClient {
        label: String,
        delay_ms: u64,
        outcome: Result<Decimal, String>,
    }

    impl StubClient {
        fn ok(label: &str, total: Decimal, delay_ms: u64) -> Arc<dyn ExchangeClient> {
            Arc::new(Self {
                label: label.to_string(),
                delay_ms,
                outcome: Ok(total),
            })
        }

        fn failing(label: &str, error: &str) -> Arc<dyn ExchangeClient> {
            Arc::new(Self {
                label: label.to_string(),
                delay_ms: 0,
                outcome: Err(error.to_string()),
            })
        }
    }

    #[async_trait]
    impl ExchangeClient for StubClient {
        fn label(&self) -> &str {
            &self.label
        }

        async fn get_balance(&self) -> ExchangeBalanceReport {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            match &self.outcome {
                Ok(total) => ExchangeBalanceReport::ok(
                    &self.label,
                    vec![AssetBalance::new("USDT", *total, Decimal::ZERO).unwrap()],
                    *total,
                ),
                Err(e) => ExchangeBalanceReport::failed(&self.label, e.clone()),
            }
        }
    }

    struct PanickingClient;

    #[async_trait]
    impl ExchangeClient for PanickingClient {
        fn label(&self) -> &str {
            "Broken"
        }

        async fn get_balance(&self) -> ExchangeBalanceReport {
            panic!("client bug")
        }
    }

    fn cash(value: Decimal) -> CashConfig {
        CashConfig {
            value_usd: value,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_order_is_declaration_order() {
        let aggregator = BalanceAggregator::new(
            vec![
                StubClient::ok("Slow", dec!(1), 80),
                StubClient::ok("Fast", dec!(2), 0),
                StubClient::ok("Medium", dec!(3), 30),
            ],
            cash(dec!(500)),
        );

        let reports = aggregator.get_all_balances().await;
        let labels: Vec<_> = reports.iter().map(|r| r.exchange.as_str()).collect();
        assert_eq!(labels, vec!["Slow", "Fast", "Medium", "Cash"]);
        assert_eq!(aggregator.labels(), labels);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let aggregator = BalanceAggregator::new(
            vec![
                StubClient::failing("Bybit", "Bybit API credentials not set"),
                StubClient::ok("OKX", dec!(1000), 10),
            ],
            cash(dec!(0)),
        );

        let reports = aggregator.get_all_balances().await;
        assert_eq!(reports.len(), 3);
        assert_eq!(
            reports[0].error.as_deref(),
            Some("Bybit API credentials not set")
        );
        assert!(reports[0].balances.is_empty());
        assert_eq!(reports[0].total_usd, Decimal::ZERO);
        assert_eq!(reports[1].error, None);
        assert_eq!(reports[1].total_usd, dec!(1000));
    }

    #[tokio::test]
    async fn test_panicking_client_becomes_error_report() {
        let aggregator = BalanceAggregator::new(
            vec![Arc::new(PanickingClient), StubClient::ok("OKX", dec!(5), 0)],
            cash(dec!(1)),
        );

        let reports = aggregator.get_all_balances().await;
        assert_eq!(reports[0].exchange, "Broken");
        assert!(reports[0].is_error());
        assert_eq!(reports[1].total_usd, dec!(5));
    }

    #[tokio::test]
    async fn test_cash_entry() {
        let aggregator = BalanceAggregator::new(vec![], cash(dec!(2500)));
        let reports = aggregator.get_all_balances().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].exchange, "Cash");
        assert_eq!(reports[0].total_usd, dec!(2500));
        assert_eq!(reports[0].balances[0].asset, "USD");
        assert_eq!(reports[0].balances[0].free, dec!(2500));

        let empty = BalanceAggregator::new(vec![], cash(Decimal::ZERO)).cash_report();
        assert!(empty.balances.is_empty());
        assert_eq!(empty.error, None);
    }

    #[tokio::test]
    async fn test_from_config_builds_declared_accounts() {
        use crate::core::crypto::{ChaChaCipher, FixedHostIdentity};
        use crate::store::memory::MemoryBlobStore;

        let config: AppConfig = serde_yaml::from_str(
            r#"
accounts:
  - exchange: okx
  - exchange: okx
    slot: 1
    label: "OKX Savings"
  - exchange: binance
"#,
        )
        .unwrap();
        let credentials = Arc::new(CredentialStore::new(
            Arc::new(MemoryBlobStore::new()),
            Arc::new(ChaChaCipher::from_host(&FixedHostIdentity("t".into()))),
            2,
        ));
        let aggregator = BalanceAggregator::from_config(&config, credentials).unwrap();
        assert_eq!(
            aggregator.labels(),
            vec!["OKX", "OKX Savings", "Binance", "Cash"]
        );

        // No credentials anywhere: every exchange fails without network, cash still reports
        let reports = aggregator.get_all_balances().await;
        assert_eq!(reports.len(), 4);
        assert!(reports[..3].iter().all(|r| r.is_error()));
        assert!(!reports[3].is_error());
    }
}
