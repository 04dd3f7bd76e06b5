//! Interactive chat loop.
//!
//! Reads stdin line by line. Plain lines go to the agent; lines starting with
//! `/` are session commands. The status poller and knowledge panel run in the
//! background and refresh after every sent message.

use crate::render;
use agent_chat_core::{
    BackendClient, ClientConfig, KnowledgePanel, Role, SessionController, SessionState,
    StatusPoller, StatusSnapshot,
};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Message(&'a str),
    Clear,
    New,
    Retry,
    Status,
    Knowledge,
    Search(&'a str),
    Stream,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Message(line);
    };
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((command, ""));
    match name {
        "clear" => Input::Clear,
        "new" => Input::New,
        "retry" => Input::Retry,
        "status" => Input::Status,
        "knowledge" | "kb" => Input::Knowledge,
        "search" => Input::Search(rest),
        "stream" => Input::Stream,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        _ => Input::Unknown(name),
    }
}

fn print_commands() {
    println!("  /clear           clear the conversation");
    println!("  /new             start a new conversation");
    println!("  /retry           re-send your last message");
    println!("  /status          agent health and configuration");
    println!("  /knowledge       knowledge base and memory stats");
    println!("  /search <query>  search the knowledge base");
    println!("  /stream          toggle streamed replies");
    println!("  /quit            leave");
}

fn prompt() {
    print!("you> ");
    let _ = std::io::stdout().flush();
}

pub async fn run(config: Result<ClientConfig, String>) -> Result<(), String> {
    let config = config?;
    let client = Arc::new(BackendClient::from_config(&config));

    let session = SessionController::connect(client.clone()).await;
    let interval = config.polling_enabled.then(|| config.poll_interval());
    let poller = Arc::new(StatusPoller::new(client.clone(), interval));
    let panel = Arc::new(KnowledgePanel::with_search_limit(client, config.search_limit));

    let poller_task = poller.spawn();
    let follower = poller.follow(session.events());
    let watcher = panel.watch_refresh(session.events());
    let monitor = spawn_connection_monitor(poller.subscribe(), session.is_connected());

    println!();
    if session.is_connected() {
        println!("  ● Connected to {}", config.base_url);
    } else {
        println!(
            "  ✗ Agent at {} is not ready; messages will fail until it is.",
            config.base_url
        );
    }
    println!("  Type /help for commands.");
    println!();
    for message in session.messages() {
        println!("{}", render::format_message(&message));
    }

    let mut streaming = config.streaming;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let outcome = loop {
        prompt();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(format!("stdin: {}", e)),
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Message(text) if streaming => stream_and_print(&session, text).await,
            Input::Message(text) => send_and_print(&session, text).await,
            Input::Clear => {
                session.clear().await;
                println!("  Conversation cleared.");
            }
            Input::New => match session.start_new_conversation().await {
                Ok(()) => println!("  Started a new conversation."),
                Err(e) => println!("  ✗ Could not start a new conversation: {}", e),
            },
            Input::Retry => {
                let before = session.messages().len();
                if session.retry_last().await {
                    print_replies(&session.snapshot(), before);
                } else {
                    println!("  Nothing to retry.");
                }
            }
            Input::Status => {
                poller.refresh().await;
                println!("{}", render::status_table(&poller.snapshot()));
            }
            Input::Knowledge => show_knowledge(&panel).await,
            Input::Search(query) if query.is_empty() => println!("  usage: /search <query>"),
            Input::Search(query) => match panel.search(query, None).await {
                Some(res) if res.results.is_empty() => println!("  No matches for \"{}\".", res.query),
                Some(res) => println!("{}", render::search_table(&res)),
                None => println!(
                    "  ✗ Search failed: {}",
                    panel.snapshot().error.unwrap_or_default()
                ),
            },
            Input::Stream => {
                streaming = !streaming;
                println!("  Streaming {}.", if streaming { "on" } else { "off" });
            }
            Input::Help => print_commands(),
            Input::Quit => break Ok(()),
            Input::Unknown(name) => println!("  Unknown command /{}. Type /help.", name),
        }
    };

    poller.shutdown();
    panel.shutdown();
    session.shutdown();
    drop(session);
    monitor.abort();
    let (poller_res, follower_res, watcher_res) = tokio::join!(poller_task, follower, watcher);
    check_task("status poller", poller_res);
    check_task("status follower", follower_res);
    check_task("knowledge watcher", watcher_res);
    tracing::info!("chat session closed");
    outcome
}

/// Logs a background task that panicked or was cancelled. Returns whether it finished cleanly.
fn check_task(task: &str, res: Result<(), JoinError>) -> bool {
    match res {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(task, error = %e, "background task failed");
            false
        }
    }
}

async fn send_and_print(session: &SessionController, text: &str) {
    let before = session.messages().len();
    session.send(text).await;
    print_replies(&session.snapshot(), before);
}

/// Prints everything appended after index `from` except the user's own lines.
fn print_replies(state: &SessionState, from: usize) {
    for message in state.messages.iter().skip(from) {
        if message.role != Role::User {
            println!("{}", render::format_message(message));
        }
    }
}

/// New text of the streamed assistant entry (the one after the user line at `user_index`).
fn assistant_delta(state: &SessionState, user_index: usize, shown: &mut usize) -> String {
    let Some(reply) = state
        .messages
        .get(user_index + 1)
        .filter(|m| m.role == Role::Assistant)
    else {
        return String::new();
    };
    let delta = reply.content.get(*shown..).unwrap_or_default().to_string();
    *shown = reply.content.len();
    delta
}

async fn stream_and_print(session: &SessionController, text: &str) {
    let mut rx = session.subscribe();
    let user_index = session.messages().len();
    let mut shown = 0usize;

    print!("agent> ");
    let send = session.send_streaming(text);
    tokio::pin!(send);
    loop {
        tokio::select! {
            _ = &mut send => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let delta = assistant_delta(&rx.borrow_and_update(), user_index, &mut shown);
                print!("{}", delta);
                let _ = std::io::stdout().flush();
            }
        }
    }
    let delta = assistant_delta(&session.snapshot(), user_index, &mut shown);
    println!("{}", delta);
}

async fn show_knowledge(panel: &KnowledgePanel) {
    panel.refresh_all().await;
    let state = panel.snapshot();
    if let Some(stats) = &state.knowledge_stats {
        println!("{}", render::knowledge_table(stats));
    }
    if let Some(stats) = &state.memory_stats {
        println!("{}", render::memory_table(stats));
    }
    if let Some(err) = &state.error {
        println!("  ⚠ {}", err);
    }
}

/// Prints a notice whenever the poller's view of connectivity flips.
fn spawn_connection_monitor(
    mut rx: watch::Receiver<StatusSnapshot>,
    mut connected: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let (loading, now) = {
                let snap = rx.borrow_and_update();
                (snap.is_loading, snap.is_connected())
            };
            if loading || now == connected {
                continue;
            }
            connected = now;
            if now {
                println!("\n  ● Agent is back online.");
            } else {
                println!("\n  ✗ Lost connection to the agent.");
            }
            prompt();
        }
    })
}
