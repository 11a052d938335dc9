pub mod cli;
pub mod core;
pub mod exchanges;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::credentials::{CredentialStore, CredentialUpdate};
use crate::core::crypto::{ChaChaCipher, HostIdentity, SystemHostIdentity};
use crate::core::exchange::ExchangeAccount;
use crate::core::history::{HistoryStore, TimeRange};
use crate::exchanges::BalanceAggregator;
use crate::store::Database;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Balances { record: bool },
    History { range: TimeRange },
    Metrics,
    SetCredentials(CredentialUpdate),
    ClearCredentials,
    CredentialStatus,
}

/// Everything a command needs, wired once from the configuration.
pub struct App {
    pub config: AppConfig,
    pub credentials: Arc<CredentialStore>,
    pub history: HistoryStore,
    pub aggregator: BalanceAggregator,
}

impl App {
    pub fn open(config: AppConfig) -> Result<Self> {
        Self::open_with_host(config, &SystemHostIdentity)
    }

    pub fn open_with_host(config: AppConfig, host: &dyn HostIdentity) -> Result<Self> {
        let data_path = config.default_data_path()?;
        let database = Database::open(&data_path)?;

        // Every configured OKX account needs a slot even if `okx_slots` is lower.
        let okx_slots = config
            .accounts
            .iter()
            .filter_map(|a| match a.account {
                ExchangeAccount::Okx { slot } => Some(slot + 1),
                _ => None,
            })
            .fold(config.okx_slots, usize::max);

        let credentials = Arc::new(CredentialStore::open(
            Arc::new(database.blob_store()?),
            Arc::new(ChaChaCipher::from_host(host)),
            okx_slots,
        ));
        let history = HistoryStore::new(Arc::new(database.history_backend()?))
            .with_retention_days(config.history.retention_days);
        let aggregator = BalanceAggregator::from_config(&config, Arc::clone(&credentials))?;
        debug!("Opened app data at {}", data_path.display());

        Ok(App {
            config,
            credentials,
            history,
            aggregator,
        })
    }

    pub async fn run(&self, command: AppCommand) -> Result<()> {
        match command {
            AppCommand::Balances { record } => {
                cli::balances::run(&self.aggregator, &self.history, record).await
            }
            AppCommand::History { range } => cli::history::run(&self.history, range),
            AppCommand::Metrics => cli::metrics::run(&self.history),
            AppCommand::SetCredentials(update) => cli::credentials::set(&self.credentials, update),
            AppCommand::ClearCredentials => cli::credentials::clear(&self.credentials),
            AppCommand::CredentialStatus => cli::credentials::status(&self.credentials),
        }
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("xbal starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    App::open(config)?.run(command).await
}
