//! **agent-chat**: terminal front-end for a conversational agent backend.
//!
//! ## Usage
//!
//! ```text
//! agent-chat                             interactive chat (default)
//! agent-chat chat                        same
//! agent-chat status                      health + agent status table
//! agent-chat knowledge                   knowledge base and memory stats
//! agent-chat search <query> [--limit N]
//! agent-chat config                      print the effective configuration
//! agent-chat help                        print usage
//! ```
//!
//! Configuration comes from `config/agent_chat.toml` (or `AGENT_CHAT_CONFIG`)
//! and `AGENT_CHAT__*` environment variables; `.env` is loaded first.

mod chat;
mod render;

use agent_chat_core::{BackendClient, ClientConfig, KnowledgePanel, StatusPoller};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    // .env first so it can set RUST_LOG
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = dotenv {
        tracing::debug!(error = %e, ".env not loaded; using process environment");
    }

    let args: Vec<String> = std::env::args().collect();
    let sub = args.get(1).map(|s| s.as_str()).unwrap_or("chat");

    let result = match sub {
        "chat" => chat::run(load_config()).await,
        "status" => run_status(load_config()).await,
        "knowledge" | "kb" => run_knowledge(load_config()).await,
        "search" => match parse_search_args(&args[2..]) {
            Ok((query, limit)) => run_search(load_config(), &query, limit).await,
            Err(e) => Err(e),
        },
        "config" => run_config(load_config()),
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        other => Err(format!(
            "unknown subcommand '{}'. Use: agent-chat [chat|status|knowledge|search|config|help]",
            other
        )),
    };

    if let Err(e) = result {
        eprintln!("agent-chat {}: {}", sub, e);
        std::process::exit(1);
    }
}

fn load_config() -> Result<ClientConfig, String> {
    ClientConfig::load().map_err(|e| format!("Config: {}", e))
}

fn print_help() {
    println!("agent-chat v{}", VERSION);
    println!();
    println!("Usage: agent-chat [COMMAND]");
    println!();
    println!("Commands:");
    println!("  chat                        Interactive chat session (default)");
    println!("  status                      Backend health and agent configuration");
    println!("  knowledge                   Knowledge base and conversation memory stats");
    println!("  search <query> [--limit N]  Similarity search over the knowledge base");
    println!("  config                      Print the effective configuration");
    println!("  help                        Print this help message");
    println!();
    println!("In chat, type /help for session commands.");
    println!("Configure via AGENT_CHAT_CONFIG, config/agent_chat.toml or AGENT_CHAT__* env vars.");
}

/// `search` arguments: every word that is not `--limit N` / `-n N` joins the query.
fn parse_search_args(args: &[String]) -> Result<(String, Option<usize>), String> {
    let mut words = Vec::new();
    let mut limit = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--limit" | "-n" => {
                let raw = iter
                    .next()
                    .ok_or_else(|| format!("{} needs a value", arg))?;
                let n: usize = raw
                    .parse()
                    .map_err(|_| format!("invalid limit '{}'", raw))?;
                if n == 0 {
                    return Err("limit must be at least 1".to_string());
                }
                limit = Some(n);
            }
            word => words.push(word),
        }
    }
    let query = words.join(" ");
    if query.trim().is_empty() {
        return Err("usage: agent-chat search <query> [--limit N]".to_string());
    }
    Ok((query, limit))
}

async fn run_status(config: Result<ClientConfig, String>) -> Result<(), String> {
    let config = config?;
    let client = Arc::new(BackendClient::from_config(&config));
    let poller = StatusPoller::new(client, None);
    poller.refresh().await;

    let snapshot = poller.snapshot();
    println!();
    println!("  Agent backend at {}", config.base_url);
    println!();
    println!("{}", render::status_table(&snapshot));
    println!();

    if snapshot.health.is_none() {
        return Err(format!(
            "backend unreachable at {} ({})",
            config.base_url,
            snapshot.error.unwrap_or_default()
        ));
    }
    Ok(())
}

async fn run_knowledge(config: Result<ClientConfig, String>) -> Result<(), String> {
    let config = config?;
    let client = Arc::new(BackendClient::from_config(&config));
    let panel = KnowledgePanel::with_search_limit(client, config.search_limit);
    panel.refresh_all().await;

    let state = panel.snapshot();
    println!();
    if let Some(stats) = &state.knowledge_stats {
        println!("{}", render::knowledge_table(stats));
    }
    if let Some(stats) = &state.memory_stats {
        println!("{}", render::memory_table(stats));
    }
    println!();

    match (state.knowledge_stats, state.memory_stats, state.error) {
        (None, None, Some(err)) => Err(err),
        (_, _, Some(err)) => {
            eprintln!("  ⚠ {}", err);
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn run_search(
    config: Result<ClientConfig, String>,
    query: &str,
    limit: Option<usize>,
) -> Result<(), String> {
    let config = config?;
    let client = Arc::new(BackendClient::from_config(&config));
    let panel = KnowledgePanel::with_search_limit(client, config.search_limit);

    match panel.search(query, limit).await {
        Some(res) => {
            println!();
            println!("  {} result(s) for \"{}\"", res.result_count, res.query);
            if !res.results.is_empty() {
                println!("{}", render::search_table(&res));
            }
            println!();
            Ok(())
        }
        None => Err(panel
            .snapshot()
            .error
            .unwrap_or_else(|| "search failed".to_string())),
    }
}

fn run_config(config: Result<ClientConfig, String>) -> Result<(), String> {
    let text = config?.to_toml().map_err(|e| e.to_string())?;
    print!("{}", text);
    Ok(())
}
