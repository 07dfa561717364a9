//! sbctl - drive remote MCP tools through switchboard
//!
//! Subcommands:
//! - `sbctl tools` - connect and list every tool with its capabilities
//! - `sbctl call <endpoint> <tool> [json]` - call one tool, print the normalized output
//! - `sbctl chat` - interactive conversation with the connected tools
//! - `sbctl config` - print the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use switchconf::SwitchConfig;

mod chat;
mod commands;
mod telemetry;

#[derive(Parser)]
#[command(name = "sbctl")]
#[command(about = "Remote MCP tools as model functions")]
#[command(version)]
struct Cli {
    /// Config file, used instead of ./switchboard.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to servers and list their tools
    Tools {
        /// Server endpoint (repeatable); defaults to the configured servers
        #[arg(long = "server")]
        servers: Vec<String>,

        /// Print each tool's generation schema as JSON
        #[arg(long)]
        json: bool,
    },

    /// Call a tool and print its normalized output
    Call {
        /// Server endpoint (e.g., http://localhost:8000/mcp)
        endpoint: String,

        /// Tool name
        tool: String,

        /// Arguments as a JSON object
        args: Option<String>,
    },

    /// Chat with a model that can use the servers' tools
    Chat {
        /// Server endpoint (repeatable); defaults to the configured servers
        #[arg(long = "server")]
        servers: Vec<String>,
    },

    /// Print the effective configuration and where it came from
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = SwitchConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    let _telemetry = telemetry::init(
        &config.telemetry.log_level,
        config.telemetry.otlp_endpoint.as_deref(),
    )?;

    match cli.command {
        Commands::Tools { servers, json } => {
            commands::tools(&config, endpoints_or_configured(servers, &config), json).await?;
        }
        Commands::Call {
            endpoint,
            tool,
            args,
        } => {
            commands::call(&config, &endpoint, &tool, args.as_deref()).await?;
        }
        Commands::Chat { servers } => {
            chat::run(&config, endpoints_or_configured(servers, &config)).await?;
        }
        Commands::Config => {
            for file in &sources.files {
                println!("# file: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# env: {}", var);
            }
            let mut shown = config.clone();
            if shown.session.api_key.is_some() {
                shown.session.api_key = Some("<redacted>".into());
            }
            print!("{}", shown.to_toml()?);
        }
    }

    Ok(())
}

fn endpoints_or_configured(servers: Vec<String>, config: &SwitchConfig) -> Vec<String> {
    if servers.is_empty() {
        config.servers.endpoints.clone()
    } else {
        servers
    }
}
