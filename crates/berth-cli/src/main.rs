//! berth - Command-line interface for the berth runtime orchestrator

use anyhow::Result;
use berth_core::OrchestratorConfig;
use berth_runtime::TunnelProvider;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::debug;

mod commands;
mod output;

use output::OutputFormat;

/// Command-line interface for the berth runtime orchestrator
#[derive(Debug, Parser)]
#[command(name = "berth")]
#[command(about = "Supervise, expose, and query a locally hosted inference runtime")]
#[command(version)]
pub struct Cli {
    /// Runtime API endpoint
    #[arg(
        short,
        long,
        env = "BERTH_ENDPOINT",
        default_value = "http://127.0.0.1:62171/v1"
    )]
    endpoint: String,

    /// Local port the runtime service binds
    #[arg(short, long, env = "BERTH_PORT", default_value = "62171")]
    port: u16,

    /// Operator CLI of the runtime
    #[arg(long, env = "BERTH_RUNTIME_CLI", default_value = "foundry")]
    runtime_cli: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable JSON output (overrides --output)
    #[arg(long)]
    json: bool,

    /// Timeout for requests in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Enable the retrieval index
    #[arg(long)]
    rag: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the runtime service's health and state
    #[command(name = "status")]
    Status,

    /// List catalog models and their loaded state
    #[command(name = "models")]
    Models {
        /// Show only the models currently running
        #[arg(short, long)]
        loaded: bool,
    },

    /// Start the runtime service and wait until it is healthy
    #[command(name = "start")]
    Start,

    /// Stop the runtime service
    #[command(name = "stop")]
    Stop,

    /// Load a model into the runtime
    #[command(name = "run")]
    Run {
        /// Model identifier
        model_id: String,
    },

    /// Terminate processes holding local ports
    #[command(name = "free-port")]
    FreePort {
        /// Ports to free (the configured sweep list when omitted)
        ports: Vec<u16>,
    },

    /// Expose a local port through a public tunnel
    #[command(name = "tunnel")]
    Tunnel {
        /// Local port to expose (the runtime service port when omitted)
        port: Option<u16>,

        /// Tunnel provider (cloudflared, ngrok, localtunnel)
        #[arg(long, default_value = "cloudflared")]
        provider: TunnelProvider,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "berth={},berth_runtime={},berth_core={}",
            log_level, log_level, log_level
        ))
        .with_target(false)
        .init();

    debug!("Starting berth CLI with args: {:?}", cli);

    // Resolve configuration from flags and environment
    let config = OrchestratorConfig::default()
        .with_base_url(&cli.endpoint)?
        .with_service_port(cli.port)
        .with_cli_command(&cli.runtime_cli)
        .with_request_timeout(Duration::from_secs(cli.timeout))
        .with_rag(cli.rag);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Determine output format
    let output_format = if cli.json {
        OutputFormat::Json
    } else {
        cli.output
    };

    // Execute command
    match cli.command {
        Commands::Status => {
            commands::status::show_status(&config, output_format).await?;
        }

        Commands::Models { loaded } => {
            commands::models::list_models(&config, loaded, output_format).await?;
        }

        Commands::Start => {
            commands::service::start_service(&config, output_format).await?;
        }

        Commands::Stop => {
            commands::service::stop_service(&config, output_format).await?;
        }

        Commands::Run { model_id } => {
            commands::models::run_model(&config, model_id, output_format).await?;
        }

        Commands::FreePort { ports } => {
            commands::port::free_ports(&config, ports, output_format).await?;
        }

        Commands::Tunnel { port, provider } => {
            commands::tunnel::open_tunnel(&config, port, provider, output_format).await?;
        }
    }

    Ok(())
}
