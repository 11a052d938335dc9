use super::util::{self, lenient_decimal, lenient_opt_string, lenient_vec};
use crate::core::balance::{AssetBalance, ExchangeBalanceReport, usd_value};
use crate::core::credentials::{Credential, CredentialStore};
use crate::core::exchange::{ExchangeAccount, ExchangeClient, ExchangeError};
use crate::core::signing::sign_binance;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const ACCOUNT_PATH: &str = "/api/v3/account";
const TICKER_PRICE_PATH: &str = "/api/v3/ticker/price";
const RECV_WINDOW: u64 = 5000;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccountResponse {
    #[serde(deserialize_with = "lenient_vec")]
    balances: Vec<SpotBalance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpotBalance {
    #[serde(deserialize_with = "lenient_opt_string")]
    asset: Option<String>,
    #[serde(deserialize_with = "lenient_decimal")]
    free: Decimal,
    #[serde(deserialize_with = "lenient_decimal")]
    locked: Decimal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TickerPrice {
    #[serde(deserialize_with = "lenient_opt_string")]
    symbol: Option<String>,
    #[serde(deserialize_with = "lenient_decimal")]
    price: Decimal,
}

fn build_report(
    label: &str,
    account: AccountResponse,
    prices: &HashMap<String, Decimal>,
) -> ExchangeBalanceReport {
    let mut balances = Vec::new();
    let mut total_usd = Decimal::ZERO;

    for entry in account.balances {
        let Some(asset) = entry.asset else {
            continue;
        };
        let free = entry.free.max(Decimal::ZERO);
        let locked = entry.locked.max(Decimal::ZERO);
        if let Some(balance) = AssetBalance::new(&asset, free + locked, locked) {
            total_usd += usd_value(&asset, balance.total, None, Some(prices));
            balances.push(balance);
        }
    }

    ExchangeBalanceReport::ok(label, balances, total_usd)
}

/// Spot account balances via the Binance v3 API, valued with the ticker price list.
pub struct BinanceClient {
    label: String,
    base_url: String,
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
}

impl BinanceClient {
    pub fn new(
        label: &str,
        base_url: &str,
        credentials: Arc<CredentialStore>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(BinanceClient {
            label: label.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: util::http_client(timeout)?,
            credentials,
        })
    }

    async fn fetch_prices(&self) -> Result<HashMap<String, Decimal>> {
        let url = format!("{}{}", self.base_url, TICKER_PRICE_PATH);
        debug!("Requesting ticker prices from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for {} prices", e, self.label))?;
        let body = util::read_json(response, &self.label).await?;
        let tickers: Vec<TickerPrice> = util::parse_lenient_list(body, &self.label);

        Ok(tickers
            .into_iter()
            .filter_map(|t| t.symbol.map(|symbol| (symbol, t.price)))
            .collect())
    }

    async fn fetch(&self) -> Result<ExchangeBalanceReport> {
        let Some(Credential::Api(credential)) =
            self.credentials.credential(&ExchangeAccount::Binance)
        else {
            return Err(ExchangeError::MissingCredentials(self.label.clone()).into());
        };

        let query = format!(
            "omitZeroBalances=true&recvWindow={}&timestamp={}",
            RECV_WINDOW,
            Utc::now().timestamp_millis()
        );
        let signature = sign_binance(&credential.api_secret, &query);
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, ACCOUNT_PATH, query, signature
        );
        debug!("Requesting account balances from {}{}", self.base_url, ACCOUNT_PATH);

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &credential.api_key)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for {}", e, self.label))?;
        let body = util::read_json(response, &self.label).await?;
        let account: AccountResponse = util::parse_lenient(body, &self.label);

        let prices = self.fetch_prices().await?;
        Ok(build_report(&self.label, account, &prices))
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn label(&self) -> &str {
        &self.label
    }

    #[instrument(name = "BinanceBalanceFetch", skip(self), fields(label = %self.label))]
    async fn get_balance(&self) -> ExchangeBalanceReport {
        util::into_report(&self.label, self.fetch().await)
    }
}
