//! Terminal rendering for each command.

pub mod balances;
pub mod credentials;
pub mod history;
pub mod metrics;
pub mod setup;
pub mod ui;
