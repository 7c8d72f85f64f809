use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opshub_core::HubConfig;

mod commands;

use commands::{AppContext, ConfigCmd, MetabaseCmd, NlqCmd, OrbitCmd};

#[derive(Parser)]
#[command(
    name = "opshub",
    version,
    about = "Operations hub: NLQ to SQL, ORBIT telemetry and dashboard generation"
)]
struct Cli {
    /// TOML config file (falls back to OPSHUB_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    /// Pretty-print JSON output (with --json)
    #[arg(long, global = true)]
    pretty: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Natural-language questions answered as SQL results
    Nlq {
        #[command(subcommand)]
        cmd: NlqCmd,
    },
    /// ORBIT clusters, metrics, logs and alerts
    Orbit {
        #[command(subcommand)]
        cmd: OrbitCmd,
    },
    /// Metabase dashboard generation
    Metabase {
        #[command(subcommand)]
        cmd: MetabaseCmd,
    },
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

#[tokio::main]
async fn main() {
    opshub_otel::init_with_service("opshub-cli");
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config =
        HubConfig::load_effective(cli.config.as_deref()).context("loading configuration")?;
    let ctx = AppContext {
        config,
        json: cli.json,
        pretty: cli.pretty,
    };
    match cli.command {
        Commands::Nlq { cmd } => commands::nlq::execute(&ctx, cmd).await,
        Commands::Orbit { cmd } => commands::orbit::execute(&ctx, cmd).await,
        Commands::Metabase { cmd } => commands::metabase::execute(&ctx, cmd).await,
        Commands::Config { cmd } => commands::config::execute(&ctx, cmd),
    }
}
