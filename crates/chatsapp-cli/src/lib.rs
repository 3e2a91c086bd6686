//! ChatsApp command-line interface.

pub mod commands;

use chatsapp_core::config::Config;
use chatsapp_core::error::ConfigError;
use chatsapp_core::paths;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// ChatsApp - web gateway for the chat backend
#[derive(Parser)]
#[command(name = "chatsapp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "CHATSAPP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway server
    Gateway(commands::gateway::GatewayArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Gateway(args) => commands::gateway::run(args, config_path).await,
        Commands::Config(args) => commands::config::run(args, config_path).await,
        Commands::Version => {
            println!("chatsapp {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Config file in effect: `--config` if given, else the default location.
pub fn config_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(paths::config_file()?),
    }
}

/// Load the config file with environment overrides. A missing file yields defaults.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let path = config_path(explicit)?;
    match Config::load(&path) {
        Ok(config) => Ok(config.with_env_overrides()),
        Err(ConfigError::NotFound(_)) => Ok(Config::from_env_defaults()),
        Err(e) => Err(anyhow::anyhow!("Failed to load {}: {}", path.display(), e)),
    }
}

/// Log filter for the workspace crates. Each `-v` raises the level one step.
pub fn filter_directive(verbose: u8, configured: &str) -> String {
    let level = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    format!("chatsapp={level},tower_http={level}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_version() {
        let cli = Cli::try_parse_from(["chatsapp", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn test_parse_gateway_run() {
        let cli = Cli::try_parse_from([
            "chatsapp", "gateway", "run", "--port", "8080", "--backend", "memory",
        ])
        .unwrap();
        match cli.command {
            Commands::Gateway(args) => match args.command {
                commands::gateway::GatewayCommand::Run {
                    bind,
                    port,
                    backend,
                } => {
                    assert!(bind.is_none());
                    assert_eq!(port, Some(8080));
                    assert_eq!(backend.as_deref(), Some("memory"));
                }
            },
            _ => panic!("Expected Gateway command"),
        }
    }

    #[test]
    fn test_parse_config_init_force() {
        let cli = Cli::try_parse_from(["chatsapp", "config", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Config(args) => {
                assert!(matches!(
                    args.command,
                    commands::config::ConfigCommand::Init { force: true }
                ));
            }
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_verbose_count() {
        let cli = Cli::try_parse_from(["chatsapp", "-vv", "version"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_unknown_command_fails() {
        assert!(Cli::try_parse_from(["chatsapp", "agent"]).is_err());
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(0, "warn"), "chatsapp=warn,tower_http=warn");
        assert_eq!(filter_directive(1, "warn"), "chatsapp=debug,tower_http=debug");
        assert_eq!(filter_directive(5, "info"), "chatsapp=trace,tower_http=trace");
    }

    #[test]
    fn test_missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.json5"))).unwrap();
        assert_eq!(config.gateway.port, Config::from_env_defaults().gateway.port);
    }

    #[test]
    fn test_broken_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatsapp.json5");
        std::fs::write(&path, "{ gateway: ").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
