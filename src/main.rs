use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use xbal::cli::credentials::build_update;
use xbal::core::exchange::ExchangeKind;
use xbal::core::history::TimeRange;
use xbal::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch balances from every configured account
    Balances {
        /// Store a snapshot of the fetched totals
        #[arg(short, long)]
        record: bool,
    },
    /// Show recorded daily totals
    History {
        /// One of 7d, 30d, 90d, 1y, all
        #[arg(short, long, default_value = "30d")]
        range: TimeRange,
    },
    /// Show 24h, 7d and 30d change
    Metrics,
    /// Manage stored exchange API credentials
    Credentials {
        #[command(subcommand)]
        command: CredentialCommands,
    },
}

#[derive(Subcommand)]
enum CredentialCommands {
    /// Store API credentials for an exchange
    Set {
        /// bybit, binance or okx
        exchange: ExchangeKind,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        api_secret: String,
        /// Required for OKX
        #[arg(long)]
        passphrase: Option<String>,
        /// OKX account slot
        #[arg(long, default_value_t = 0)]
        slot: usize,
    },
    /// Remove every stored credential
    Clear,
    /// Show which accounts have credentials
    Status,
}

impl TryFrom<Commands> for xbal::AppCommand {
    type Error = anyhow::Error;

    fn try_from(cmd: Commands) -> Result<xbal::AppCommand> {
        Ok(match cmd {
            Commands::Balances { record } => xbal::AppCommand::Balances { record },
            Commands::History { range } => xbal::AppCommand::History { range },
            Commands::Metrics => xbal::AppCommand::Metrics,
            Commands::Credentials { command } => match command {
                CredentialCommands::Set {
                    exchange,
                    api_key,
                    api_secret,
                    passphrase,
                    slot,
                } => xbal::AppCommand::SetCredentials(build_update(
                    exchange, api_key, api_secret, passphrase, slot,
                )?),
                CredentialCommands::Clear => xbal::AppCommand::ClearCredentials,
                CredentialCommands::Status => xbal::AppCommand::CredentialStatus,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => xbal::cli::setup::setup_at_path(path),
            None => xbal::cli::setup::setup(),
        },
        Some(cmd) => match xbal::AppCommand::try_from(cmd) {
            Ok(command) => xbal::run_command(command, cli.config_path.as_deref()).await,
            Err(e) => Err(e),
        },
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
