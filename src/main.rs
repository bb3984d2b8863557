//! SSP gateway CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "ssp")]
#[command(about = "Semantic sensor gateway: cached RDF views over files, endpoints and virtual sensors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (defaults apply when it does not exist)
    #[arg(short, long, default_value = "ssp.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,
    },
    /// Run one query over the configured files and exit
    Query {
        /// Query text, e.g. `SELECT ?s WHERE { ?s ?p ?o }`
        text: String,
    },
    /// Print the effective configuration
    CheckConfig,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ssp={level},ssp_core={level},ssp_files={level},ssp_virtual={level},ssp_server={level},tower_http=info",
            level = log_level
        ))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = config::Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            tracing::info!("SSP v{}", env!("CARGO_PKG_VERSION"));
            commands::serve(config).await
        }
        Commands::Query { text } => commands::query(config, &text).await,
        Commands::CheckConfig => commands::check_config(&config),
        Commands::Version => {
            println!("SSP v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
