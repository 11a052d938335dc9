use crate::core::credentials::DEFAULT_OKX_SLOTS;
use crate::core::exchange::ExchangeAccount;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AccountConfig {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub account: ExchangeAccount,
}

impl AccountConfig {
    pub fn label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.account.default_label())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CashConfig {
    #[serde(default = "default_cash_label")]
    pub label: String,
    #[serde(default = "default_cash_asset")]
    pub asset: String,
    pub value_usd: Decimal,
}

fn default_cash_label() -> String {
    "Cash".to_string()
}

fn default_cash_asset() -> String {
    "USD".to_string()
}

impl Default for CashConfig {
    fn default() -> Self {
        CashConfig {
            label: default_cash_label(),
            asset: default_cash_asset(),
            value_usd: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExchangeProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub bybit: Option<ExchangeProviderConfig>,
    pub binance: Option<ExchangeProviderConfig>,
    pub okx: Option<ExchangeProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            bybit: Some(ExchangeProviderConfig {
                base_url: "https://api.bybit.com".to_string(),
            }),
            binance: Some(ExchangeProviderConfig {
                base_url: "https://api.binance.com".to_string(),
            }),
            okx: Some(ExchangeProviderConfig {
                base_url: "https://www.okx.com".to_string(),
            }),
        }
    }
}

impl ProvidersConfig {
    pub fn bybit_url(&self) -> &str {
        self.bybit
            .as_ref()
            .map_or("https://api.bybit.com", |p| &p.base_url)
    }

    pub fn binance_url(&self) -> &str {
        self.binance
            .as_ref()
            .map_or("https://api.binance.com", |p| &p.base_url)
    }

    pub fn okx_url(&self) -> &str {
        self.okx
            .as_ref()
            .map_or("https://www.okx.com", |p| &p.base_url)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct HistoryConfig {
    pub retention_days: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_accounts")]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub cash: CashConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "default_okx_slots")]
    pub okx_slots: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub history: HistoryConfig,
    pub data_path: Option<String>,
}

fn default_accounts() -> Vec<AccountConfig> {
    [
        ExchangeAccount::Bybit,
        ExchangeAccount::Binance,
        ExchangeAccount::Okx { slot: 0 },
    ]
    .into_iter()
    .map(|account| AccountConfig {
        label: None,
        account,
    })
    .collect()
}

fn default_okx_slots() -> usize {
    DEFAULT_OKX_SLOTS
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            accounts: default_accounts(),
            cash: CashConfig::default(),
            providers: ProvidersConfig::default(),
            okx_slots: default_okx_slots(),
            request_timeout_secs: default_request_timeout_secs(),
            history: HistoryConfig::default(),
            data_path: None,
        }
    }
}

impl AppConfig {
    /// Loads the default config file, falling back to defaults when it does not exist.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "xbal", "xbal")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "xbal", "xbal")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
