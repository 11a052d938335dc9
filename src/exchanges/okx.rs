use super::util::{self, lenient_decimal, lenient_opt_string, lenient_string, lenient_vec};
use crate::core::balance::{AssetBalance, ExchangeBalanceReport, usd_value};
use crate::core::credentials::{Credential, CredentialStore};
use crate::core::exchange::{ExchangeAccount, ExchangeClient, ExchangeError};
use crate::core::signing::{okx_timestamp, sign_okx};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const BALANCE_PATH: &str = "/api/v5/account/balance";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BalanceResponse {
    #[serde(deserialize_with = "lenient_string")]
    code: String,
    #[serde(deserialize_with = "lenient_string")]
    msg: String,
    #[serde(deserialize_with = "lenient_vec")]
    data: Vec<AccountData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccountData {
    #[serde(deserialize_with = "lenient_vec")]
    details: Vec<CurrencyDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CurrencyDetail {
    #[serde(deserialize_with = "lenient_opt_string")]
    ccy: Option<String>,
    #[serde(deserialize_with = "lenient_decimal")]
    cash_bal: Decimal,
    #[serde(deserialize_with = "lenient_decimal")]
    avail_bal: Decimal,
    #[serde(deserialize_with = "lenient_decimal")]
    eq_usd: Decimal,
}

fn build_report(label: &str, response: BalanceResponse) -> ExchangeBalanceReport {
    let mut balances = Vec::new();
    let mut total_usd = Decimal::ZERO;

    // Only the first account entry carries the trading account details.
    let details = response
        .data
        .into_iter()
        .next()
        .map(|d| d.details)
        .unwrap_or_default();

    for detail in details {
        let Some(asset) = detail.ccy else {
            continue;
        };
        let locked = detail.cash_bal - detail.avail_bal;
        if let Some(balance) = AssetBalance::new(&asset, detail.cash_bal, locked) {
            total_usd += usd_value(&asset, balance.total, Some(detail.eq_usd), None);
            balances.push(balance);
        }
    }

    ExchangeBalanceReport::ok(label, balances, total_usd)
}

/// Trading account balance via the OKX v5 API, one client per account slot.
pub struct OkxClient {
    label: String,
    slot: usize,
    base_url: String,
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
}

impl OkxClient {
    pub fn new(
        label: &str,
        slot: usize,
        base_url: &str,
        credentials: Arc<CredentialStore>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(OkxClient {
            label: label.to_string(),
            slot,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: util::http_client(timeout)?,
            credentials,
        })
    }

    async fn fetch(&self) -> Result<ExchangeBalanceReport> {
        let account = ExchangeAccount::Okx { slot: self.slot };
        let Some(Credential::Passphrase(credential)) = self.credentials.credential(&account)
        else {
            return Err(ExchangeError::MissingCredentials(self.label.clone()).into());
        };

        let timestamp = okx_timestamp(Utc::now());
        let signature = sign_okx(&credential.api_secret, &timestamp, "GET", BALANCE_PATH, "");

        let url = format!("{}{}", self.base_url, BALANCE_PATH);
        debug!("Requesting account balance from {}", url);

        let response = self
            .client
            .get(&url)
            .header("OK-ACCESS-KEY", &credential.api_key)
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", &timestamp)
            .header("OK-ACCESS-PASSPHRASE", &credential.passphrase)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for {}", e, self.label))?;

        let body = util::read_json(response, &self.label).await?;
        let parsed: BalanceResponse = util::parse_lenient(body, &self.label);
        if !parsed.code.is_empty() && parsed.code != "0" {
            return Err(ExchangeError::Rejected {
                exchange: self.label.clone(),
                message: parsed.msg,
            }
            .into());
        }

        Ok(build_report(&self.label, parsed))
    }
}

#[async_trait]
impl ExchangeClient for OkxClient {
    fn label(&self) -> &str {
        &self.label
    }

    #[instrument(name = "OkxBalanceFetch", skip(self), fields(label = %self.label, slot = self.slot))]
    async fn get_balance(&self) -> ExchangeBalanceReport {
        util::into_report(&self.label, self.fetch().await)
    }
}
