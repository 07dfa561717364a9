//! Interactive chat over a [`ConversationOrchestrator`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use rustyline::DefaultEditor;
use serde_json::Value;
use switchboard::{
    BridgeReply, ConversationEvent, ConversationOrchestrator, EventBus, MediaStore,
    OpenAiSessionFactory, OpenAiSessionOptions, RespondOutcome, ServerOrchestrator,
    StructuredResponse, WidgetBridge,
};
use switchconf::SwitchConfig;

const HELP: &str = "\
/servers                     list connected servers
/add <url>...                connect more servers
/set <url>...                replace the server set
/app                         write the last app's HTML to the media dir
/bridge <message> [json]     send a widget message to the last app
/resource <endpoint> <uri>   save a resource to the media dir
/exit                        quit";

pub async fn run(config: &SwitchConfig, endpoints: Vec<String>) -> Result<()> {
    let factory = OpenAiSessionFactory::new(OpenAiSessionOptions {
        base_url: config.session.base_url.clone(),
        model: config.session.model.clone(),
        api_key: config.session.api_key.clone(),
        max_tool_iterations: config.session.max_tool_iterations,
        timeout: Duration::from_secs(config.session.timeout_secs),
    });

    let conversation = Arc::new(ConversationOrchestrator::new(
        Arc::new(ServerOrchestrator::http()),
        Arc::new(factory),
        EventBus::default(),
        Arc::new(MediaStore::new(config.media.resolved_dir())),
    ));

    conversation
        .initialize()
        .await
        .context("Failed to start a session")?;
    if !endpoints.is_empty() {
        report(conversation.set_servers(&endpoints).await);
    }

    let printer = spawn_event_printer(&conversation);

    println!(
        "{} {}",
        "switchboard chat".bright_cyan().bold(),
        config.session.model.dimmed()
    );
    println!("Type /help for commands\n");

    let mut rl = DefaultEditor::new()?;
    loop {
        let line = match rl.readline("you> ") {
            Ok(line) => line,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        if let Some(command) = line.strip_prefix('/') {
            if !slash_command(&conversation, command).await {
                break;
            }
            continue;
        }

        match conversation.respond(line).await {
            Ok(RespondOutcome::Answered(answer)) => print_answer(&answer),
            Ok(RespondOutcome::Dropped) => println!("{}", "(still answering)".dimmed()),
            Err(e) => eprintln!("{} {}", "✗".bright_red(), e.to_string().bright_red()),
        }
    }

    printer.abort();
    conversation.servers().disconnect_all().await;
    Ok(())
}

/// Returns false when the REPL should exit.
async fn slash_command(conversation: &Arc<ConversationOrchestrator>, command: &str) -> bool {
    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default();
    let rest: Vec<String> = words.map(str::to_string).collect();

    match name {
        "exit" | "quit" => return false,
        "help" => println!("{}", HELP),
        "servers" => {
            let servers = conversation.servers().servers().await;
            if servers.is_empty() {
                println!("{}", "no servers connected".dimmed());
            }
            for server in servers {
                println!(
                    "  {} {} ({} tools)",
                    server.info.name.bright_cyan(),
                    server.endpoint.dimmed(),
                    server.tools.len()
                );
            }
        }
        "add" if !rest.is_empty() => report(conversation.add_servers(&rest).await),
        "set" => report(conversation.set_servers(&rest).await),
        "app" => {
            if let Err(e) = write_app(conversation).await {
                eprintln!("{} {:#}", "✗".bright_red(), e);
            }
        }
        "bridge" if !rest.is_empty() => {
            let body = rest[1..].join(" ");
            match bridge_message(conversation, &rest[0], &body).await {
                Ok(reply) => println!("{}", serde_json::to_string_pretty(&reply).unwrap_or_default()),
                Err(e) => eprintln!("{} {:#}", "✗".bright_red(), e),
            }
        }
        "resource" if rest.len() == 2 => {
            match save_resource(conversation, &rest[0], &rest[1]).await {
                Ok(paths) if paths.is_empty() => println!("{}", "nothing saved".dimmed()),
                Ok(paths) => paths.iter().for_each(|p| println!("  {}", p.bright_green())),
                Err(e) => eprintln!("{} {:#}", "✗".bright_red(), e),
            }
        }
        _ => println!("{}", HELP),
    }
    true
}

fn report(result: Result<(), switchboard::ConversationError>) {
    match result {
        Ok(()) => println!("{}", "tools updated".dimmed()),
        Err(e) => eprintln!("{} {}", "✗".bright_red(), e.to_string().bright_red()),
    }
}

async fn write_app(conversation: &ConversationOrchestrator) -> Result<()> {
    let params = conversation
        .last_app_surface()
        .await
        .context("no app has been surfaced yet")?;
    let html = conversation
        .servers()
        .app_resource_html(&params.server_endpoint, &params.resource_uri)
        .await?;

    let dir = conversation.media().dir();
    std::fs::create_dir_all(dir)?;
    let path = dir.join(app_file_name(&params.tool_name));
    std::fs::write(&path, params.inject_into(&html))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("  {}", path.display().bright_green());
    Ok(())
}

/// Tool names come from remote servers, so they never reach the path unsanitized.
fn app_file_name(tool_name: &str) -> String {
    format!("{}.html", switchboard::file_stem_for(tool_name))
}

async fn bridge_message(
    conversation: &Arc<ConversationOrchestrator>,
    message: &str,
    body: &str,
) -> Result<BridgeReply> {
    let params = conversation
        .last_app_surface()
        .await
        .context("no app has been surfaced yet")?;
    let body: Value = if body.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(body).context("message body must be JSON")?
    };

    let bridge = WidgetBridge::new(conversation.clone(), params);
    Ok(bridge.handle_raw(message, &body).await)
}

async fn save_resource(
    conversation: &ConversationOrchestrator,
    endpoint: &str,
    uri: &str,
) -> Result<Vec<String>> {
    let contents = conversation.servers().read_resource(endpoint, uri).await?;
    let paths = conversation.media().save_resource_contents(&contents)?;
    Ok(paths.iter().map(|p| p.display().to_string()).collect())
}

fn spawn_event_printer(conversation: &ConversationOrchestrator) -> tokio::task::JoinHandle<()> {
    let mut events = conversation.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ConversationEvent::ToolUseBegan { message, .. }) => {
                    println!("  {}", message.yellow());
                }
                Ok(ConversationEvent::AppAvailable(params)) => {
                    println!(
                        "  {} {} (/app to open)",
                        "app available:".bright_magenta(),
                        params.resource_uri
                    );
                }
                Ok(ConversationEvent::ToolUseEnded { .. }) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_answer(answer: &StructuredResponse) {
    println!("{} {}", "assistant>".bright_cyan().bold(), answer.text_response);
    for path in answer.images.iter().chain(&answer.audios) {
        println!("  {}", path.bright_green());
    }
    for uri in &answer.resources {
        println!("  {}", uri.bright_blue());
    }
}
