//! One-shot subcommands.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;
use serde_json::{json, Map, Value};
use switchboard::{EventBus, MediaStore, ServerOrchestrator, ToolOutput, ToolRegistry};
use switchconf::SwitchConfig;

pub async fn tools(config: &SwitchConfig, endpoints: Vec<String>, as_json: bool) -> Result<()> {
    if endpoints.is_empty() {
        bail!("no servers given; pass --server or set servers.endpoints");
    }

    let servers = Arc::new(ServerOrchestrator::http());
    let report = servers.connect_many(&endpoints).await;
    for failure in &report.failures {
        eprintln!("{} {}", "✗".bright_red(), failure.to_string().bright_red());
    }

    let media = Arc::new(MediaStore::new(config.media.resolved_dir()));
    let registry = ToolRegistry::build(servers.clone(), EventBus::default(), media).await;

    if as_json {
        let listing: Vec<Value> = registry
            .tools()
            .iter()
            .map(|tool| {
                json!({
                    "endpoint": tool.endpoint(),
                    "name": tool.name(),
                    "description": tool.description(),
                    "outputTemplate": tool.capabilities().output_template,
                    "widgetAccessible": tool.capabilities().widget_accessible,
                    "schema": tool.parameters(),
                    "parameters": tool.parameters().to_json_schema(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        for server in servers.servers().await {
            println!(
                "{} {} {}",
                server.info.name.bright_cyan().bold(),
                server.info.version.as_deref().unwrap_or("").dimmed(),
                server.endpoint.dimmed()
            );
            for tool in registry.tools().iter().filter(|t| t.endpoint() == server.endpoint) {
                let mut badges = String::new();
                if tool.capabilities().output_template.is_some() {
                    badges.push_str(" [app]");
                }
                if tool.capabilities().widget_accessible {
                    badges.push_str(" [widget]");
                }
                println!(
                    "  • {}{}  {}",
                    tool.name().bright_green(),
                    badges.bright_magenta(),
                    tool.description().dimmed()
                );
            }
        }
    }

    for skipped in registry.skipped() {
        eprintln!(
            "{} skipped {} on {}: {}",
            "⚠".yellow(),
            skipped.tool.yellow(),
            skipped.endpoint,
            skipped.error
        );
    }

    servers.disconnect_all().await;
    Ok(())
}

pub async fn call(
    config: &SwitchConfig,
    endpoint: &str,
    tool: &str,
    args: Option<&str>,
) -> Result<()> {
    let arguments: Map<String, Value> = match args {
        Some(raw) => serde_json::from_str(raw).context("arguments must be a JSON object")?,
        None => Map::new(),
    };

    let servers = ServerOrchestrator::http();
    servers
        .connect(endpoint)
        .await
        .with_context(|| format!("Failed to connect to {endpoint}"))?;

    let result = servers.call_tool(endpoint, tool, arguments).await;
    servers.disconnect_all().await;
    let result = result.context("Tool call failed")?;

    let media = MediaStore::new(config.media.resolved_dir());
    let mut output = ToolOutput::from_contents(&result.content, &media)
        .context("Failed to save tool media")?;
    if result.is_error {
        output.mark_error();
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    if let Some(structured) = &result.structured_content {
        println!("{}", "structuredContent:".bright_cyan());
        println!("{}", serde_json::to_string_pretty(structured)?);
    }
    Ok(())
}
