pub mod aggregator;
pub mod binance;
pub mod bybit;
pub mod okx;
pub mod util;

use crate::core::config::{AccountConfig, AppConfig};
use crate::core::credentials::CredentialStore;
use crate::core::exchange::{ExchangeAccount, ExchangeClient};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

pub use aggregator::BalanceAggregator;

/// Builds the client for one configured account.
pub fn build_client(
    account: &AccountConfig,
    config: &AppConfig,
    credentials: Arc<CredentialStore>,
) -> Result<Arc<dyn ExchangeClient>> {
    let label = account.label();
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let providers = &config.providers;

    let client: Arc<dyn ExchangeClient> = match account.account {
        ExchangeAccount::Bybit => Arc::new(bybit::BybitClient::new(
            &label,
            providers.bybit_url(),
            credentials,
            timeout,
        )?),
        ExchangeAccount::Binance => Arc::new(binance::BinanceClient::new(
            &label,
            providers.binance_url(),
            credentials,
            timeout,
        )?),
        ExchangeAccount::Okx { slot } => Arc::new(okx::OkxClient::new(
            &label,
            slot,
            providers.okx_url(),
            credentials,
            timeout,
        )?),
    };
    Ok(client)
}
