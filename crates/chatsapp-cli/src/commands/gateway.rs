//! Gateway command.

use chatsapp_backend::BackendConnector;
use chatsapp_core::config::{BackendMode, BindMode, Config};
use chatsapp_gateway::{Gateway, GatewayConfig};
use clap::Args;
use std::path::Path;
use tracing::info;

/// Gateway command arguments.
#[derive(Args)]
pub struct GatewayArgs {
    #[command(subcommand)]
    pub command: GatewayCommand,
}

#[derive(clap::Subcommand)]
pub enum GatewayCommand {
    /// Start the gateway server
    Run {
        /// Bind mode (loopback, lan)
        #[arg(short, long)]
        bind: Option<String>,

        /// Port number
        #[arg(short, long)]
        port: Option<u16>,

        /// Backend (grpc, memory)
        #[arg(long)]
        backend: Option<String>,
    },
}

/// Parse a bind mode name.
pub fn parse_bind(value: &str) -> anyhow::Result<BindMode> {
    match value {
        "loopback" => Ok(BindMode::Loopback),
        "lan" => Ok(BindMode::Lan),
        other => anyhow::bail!("Invalid bind mode: {}. Valid options: loopback, lan", other),
    }
}

/// Parse a backend mode name.
pub fn parse_backend(value: &str) -> anyhow::Result<BackendMode> {
    match value {
        "grpc" => Ok(BackendMode::Grpc),
        "memory" => Ok(BackendMode::Memory),
        other => anyhow::bail!("Unknown backend: {}. Valid options: grpc, memory", other),
    }
}

/// Apply command-line overrides on top of the loaded config.
pub fn apply_overrides(
    mut config: Config,
    bind: Option<&str>,
    port: Option<u16>,
    backend: Option<&str>,
) -> anyhow::Result<Config> {
    if let Some(bind) = bind {
        config.gateway.bind = parse_bind(bind)?;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(backend) = backend {
        config.backend.mode = parse_backend(backend)?;
    }
    config.validate()?;
    Ok(config)
}

/// Run the gateway command.
pub async fn run(args: GatewayArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        GatewayCommand::Run {
            bind,
            port,
            backend,
        } => {
            let config = apply_overrides(
                crate::load_config(config_path)?,
                bind.as_deref(),
                port,
                backend.as_deref(),
            )?;

            match config.backend.mode {
                BackendMode::Grpc => info!(
                    account = %config.backend.account_url,
                    direct = %config.backend.direct_chat_url,
                    group = %config.backend.group_chat_url,
                    "Using gRPC backend"
                ),
                BackendMode::Memory => {
                    info!("Using in-memory backend with demo accounts (abi, bob, carol)")
                }
            }

            let connector = BackendConnector::from_config(&config.backend).await?;
            let gateway = Gateway::new(GatewayConfig::from(&config), connector);
            gateway.run().await?;
        }
    }

    Ok(())
}
