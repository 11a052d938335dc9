use super::util::{
    self, lenient_decimal, lenient_opt_string, lenient_string, lenient_struct, lenient_vec,
};
use crate::core::balance::{AssetBalance, ExchangeBalanceReport, usd_value};
use crate::core::credentials::{Credential, CredentialStore};
use crate::core::exchange::{ExchangeAccount, ExchangeClient, ExchangeError};
use crate::core::signing::sign_bybit;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const WALLET_BALANCE_PATH: &str = "/v5/account/wallet-balance";
const WALLET_BALANCE_QUERY: &str = "accountType=UNIFIED";
const RECV_WINDOW: u64 = 5000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WalletBalanceResponse {
    #[serde(deserialize_with = "lenient_string")]
    ret_code: String,
    #[serde(deserialize_with = "lenient_string")]
    ret_msg: String,
    #[serde(deserialize_with = "lenient_struct")]
    result: WalletResult,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WalletResult {
    #[serde(deserialize_with = "lenient_vec")]
    list: Vec<WalletAccount>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WalletAccount {
    #[serde(deserialize_with = "lenient_vec")]
    coin: Vec<CoinBalance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CoinBalance {
    #[serde(deserialize_with = "lenient_opt_string")]
    coin: Option<String>,
    #[serde(deserialize_with = "lenient_decimal")]
    wallet_balance: Decimal,
    #[serde(deserialize_with = "lenient_decimal")]
    locked: Decimal,
    #[serde(deserialize_with = "lenient_decimal")]
    usd_value: Decimal,
}

fn build_report(label: &str, response: WalletBalanceResponse) -> ExchangeBalanceReport {
    let mut balances = Vec::new();
    let mut total_usd = Decimal::ZERO;

    for coin in response.result.list.into_iter().flat_map(|a| a.coin) {
        let Some(asset) = coin.coin else {
            continue;
        };
        if let Some(balance) = AssetBalance::new(&asset, coin.wallet_balance, coin.locked) {
            total_usd += usd_value(&asset, balance.total, Some(coin.usd_value), None);
            balances.push(balance);
        }
    }

    ExchangeBalanceReport::ok(label, balances, total_usd)
}

/// Unified-account wallet balance via the Bybit v5 API.
pub struct BybitClient {
    label: String,
    base_url: String,
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
}

impl BybitClient {
    pub fn new(
        label: &str,
        base_url: &str,
        credentials: Arc<CredentialStore>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(BybitClient {
            label: label.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: util::http_client(timeout)?,
            credentials,
        })
    }

    async fn fetch(&self) -> Result<ExchangeBalanceReport> {
        let Some(Credential::Api(credential)) = self.credentials.credential(&ExchangeAccount::Bybit)
        else {
            return Err(ExchangeError::MissingCredentials(self.label.clone()).into());
        };

        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign_bybit(
            &credential.api_secret,
            &timestamp,
            &credential.api_key,
            RECV_WINDOW,
            WALLET_BALANCE_QUERY,
        );

        let url = format!(
            "{}{}?{}",
            self.base_url, WALLET_BALANCE_PATH, WALLET_BALANCE_QUERY
        );
        debug!("Requesting wallet balance from {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-BAPI-API-KEY", &credential.api_key)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-TIMESTAMP", &timestamp)
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW.to_string())
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for {}", e, self.label))?;

        let body = util::read_json(response, &self.label).await?;
        let parsed: WalletBalanceResponse = util::parse_lenient(body, &self.label);
        // A missing code is success; anything other than 0 is a rejection.
        if !parsed.ret_code.is_empty() && parsed.ret_code != "0" {
            return Err(ExchangeError::Rejected {
                exchange: self.label.clone(),
                message: parsed.ret_msg,
            }
            .into());
        }

        Ok(build_report(&self.label, parsed))
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    fn label(&self) -> &str {
        &self.label
    }

    #[instrument(name = "BybitBalanceFetch", skip(self), fields(label = %self.label))]
    async fn get_balance(&self) -> ExchangeBalanceReport {
        util::into_report(&self.label, self.fetch().await)
    }
}
