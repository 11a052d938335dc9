//! Core domain types and business logic

pub mod balance;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod exchange;
pub mod history;
pub mod log;
pub mod metrics;
pub mod signing;

// Re-export main types for cleaner imports
pub use balance::{AssetBalance, ExchangeBalanceReport};
pub use credentials::{CredentialStore, CredentialUpdate};
pub use exchange::{ExchangeAccount, ExchangeClient, ExchangeKind};
pub use history::{BalanceSnapshot, HistoryStore, TimeRange};
pub use metrics::{MetricWindow, Metrics};
