use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use pulseboard::core::alert::Direction;
use pulseboard::core::log::init_logging;
use rust_decimal::Decimal;

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
    /// Refresh the dashboard continuously until Ctrl-C
    Watch {
        /// Override the configured refresh interval, in seconds
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Refresh once and print the dashboard
    Once,
    /// Manage price alert rules
    #[command(subcommand)]
    Alerts(AlertCommands),
}

#[derive(Subcommand)]
enum AlertCommands {
    /// Show all rules and whether they are armed
    List,
    /// Add a rule that fires when SYMBOL crosses THRESHOLD
    Add {
        id: String,
        symbol: String,
        /// above or below
        direction: Direction,
        threshold: Decimal,
    },
    /// Delete a rule
    Remove { id: String },
    /// Re-arm a rule that has already fired
    Rearm { id: String },
}

impl From<AlertCommands> for pulseboard::AlertCommand {
    fn from(cmd: AlertCommands) -> pulseboard::AlertCommand {
        match cmd {
            AlertCommands::List => pulseboard::AlertCommand::List,
            AlertCommands::Add {
                id,
                symbol,
                direction,
                threshold,
            } => pulseboard::AlertCommand::Add {
                id,
                symbol,
                threshold,
                direction,
            },
            AlertCommands::Remove { id } => pulseboard::AlertCommand::Remove { id },
            AlertCommands::Rearm { id } => pulseboard::AlertCommand::Rearm { id },
        }
    }
}

impl From<Commands> for pulseboard::AppCommand {
    fn from(cmd: Commands) -> pulseboard::AppCommand {
        match cmd {
            Commands::Watch { interval } => pulseboard::AppCommand::Watch {
                interval_secs: interval,
            },
            Commands::Once => pulseboard::AppCommand::Once,
            Commands::Alerts(alerts) => pulseboard::AppCommand::Alerts(alerts.into()),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match &cli.config_path {
            Some(path) => pulseboard::cli::setup::setup_at_path(path),
            None => pulseboard::cli::setup::setup(),
        },
        Some(cmd) => pulseboard::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
