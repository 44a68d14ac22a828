// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Highclaw - session-routing agent gateway.
//!
//! Binary entry point: CLI parsing, config loading, and subcommand dispatch.

mod serve;
mod sessions;
mod shell;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use highclaw_config::HighclawConfig;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Highclaw - routes every conversation to a persistent agent session.
#[derive(Parser, Debug)]
#[command(name = "highclaw", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway and agent loop.
    Serve,
    /// Chat with the agent from the terminal.
    Shell,
    /// Inspect and edit the session store offline.
    Sessions {
        #[command(subcommand)]
        action: sessions::SessionsCommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Shell) => shell::run_shell(config).await,
        Some(Commands::Sessions { action }) => sessions::run_sessions(&config, action).await,
        None => {
            println!("highclaw: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&std::path::Path>) -> HighclawConfig {
    let loaded = match path {
        Some(path) => highclaw_config::load_and_validate_path(path),
        None => highclaw_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            highclaw_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn binary_loads_config_defaults() {
        let config = HighclawConfig::default();
        assert_eq!(config.agent.name, "highclaw");
        assert_eq!(config.gateway.port, 18789);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["highclaw", "sessions", "list", "--config", "/tmp/h.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/h.toml")));
        assert!(matches!(cli.command, Some(Commands::Sessions { .. })));
    }
}
