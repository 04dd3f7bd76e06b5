//! Terminal rendering: chat lines and comfy-table panels.

use agent_chat_core::{
    KnowledgeSearchResponse, KnowledgeStats, MemoryStats, Message, Role, StatusSnapshot,
};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn flag(on: bool) -> Cell {
    if on {
        Cell::new("✓ yes").fg(Color::Green)
    } else {
        Cell::new("✗ no").fg(Color::DarkYellow)
    }
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "—".to_string())
}

/// One chat entry as a terminal line (plus a metadata line when present).
pub fn format_message(message: &Message) -> String {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant if message.is_error() => "agent!",
        Role::Assistant => "agent",
        Role::System => "system",
    };
    let mut line = format!(
        "[{}] {}> {}",
        message.timestamp.format("%H:%M:%S"),
        who,
        message.content
    );
    if let Some(meta) = message.metadata.as_ref().filter(|_| !message.is_error()) {
        let mut details = Vec::new();
        if let Some(model) = &meta.model {
            details.push(format!("model={}", model));
        }
        if let Some(tokens) = meta.tokens_used {
            details.push(format!("tokens={}", tokens));
        }
        if meta.rag_context_used == Some(true) {
            details.push("rag".to_string());
        }
        if let Some(tools) = meta.tools_used.as_ref().filter(|t| !t.is_empty()) {
            details.push(format!("tools={}", tools.join(",")));
        }
        if !details.is_empty() {
            line.push_str(&format!("\n           ({})", details.join(" ")));
        }
    }
    line
}

pub fn status_table(snapshot: &StatusSnapshot) -> Table {
    let mut t = table(&["Field", "Value"]);
    let connected = snapshot.is_connected();
    t.add_row(vec![
        Cell::new("Connection"),
        if connected {
            Cell::new("● CONNECTED").fg(Color::Green)
        } else {
            Cell::new("✗ DISCONNECTED").fg(Color::Red)
        },
    ]);

    if let Some(h) = &snapshot.health {
        t.add_row(vec![Cell::new("Health"), Cell::new(&h.status)]);
        t.add_row(vec![Cell::new("Agent initialized"), flag(h.agent_initialized)]);
        t.add_row(vec![Cell::new("Agent"), Cell::new(opt(h.agent_name.as_ref()))]);
    }
    if let Some(s) = &snapshot.status {
        t.add_row(vec![Cell::new("Model"), Cell::new(&s.llm_model)]);
        t.add_row(vec![Cell::new("Ollama"), Cell::new(&s.ollama_url)]);
        t.add_row(vec![Cell::new("RAG"), flag(s.rag_enabled)]);
        t.add_row(vec![Cell::new("MCP"), flag(s.mcp_enabled)]);
        let tools = s
            .mcp_tools
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| t.join(", "));
        t.add_row(vec![Cell::new("MCP tools"), Cell::new(opt(tools))]);
        t.add_row(vec![
            Cell::new("Conversation"),
            Cell::new(format!("{} messages", s.conversation_length)),
        ]);
    }
    if let Some(err) = &snapshot.error {
        t.add_row(vec![Cell::new("Error"), Cell::new(err).fg(Color::Red)]);
    }
    t
}

pub fn knowledge_table(stats: &KnowledgeStats) -> Table {
    let mut t = table(&["Knowledge base", "Value"]);
    t.add_row(vec![Cell::new("Enabled"), flag(stats.enabled)]);
    t.add_row(vec![
        Cell::new("Chunks"),
        Cell::new(stats.chunk_count).set_alignment(CellAlignment::Right),
    ]);
    t.add_row(vec![Cell::new("Embedding model"), Cell::new(opt(stats.embedding_model.as_ref()))]);
    t.add_row(vec![Cell::new("Chunk size"), Cell::new(opt(stats.chunk_size))]);
    t.add_row(vec![
        Cell::new("Similarity threshold"),
        Cell::new(opt(stats.similarity_threshold)),
    ]);
    if let Some(path) = &stats.vector_db_path {
        t.add_row(vec![Cell::new("Vector store"), Cell::new(path)]);
    }
    if let Some(err) = &stats.error {
        t.add_row(vec![Cell::new("Error"), Cell::new(err).fg(Color::Red)]);
    }
    t
}

pub fn memory_table(stats: &MemoryStats) -> Table {
    let mut t = table(&["Memory", "Value"]);
    t.add_row(vec![
        Cell::new("Messages"),
        Cell::new(format!(
            "{} / {}",
            stats.conversation_length, stats.max_conversation_length
        )),
    ]);
    t.add_row(vec![
        Cell::new("Estimated tokens"),
        Cell::new(stats.estimated_tokens).set_alignment(CellAlignment::Right),
    ]);
    t.add_row(vec![Cell::new("Persistence"), flag(stats.persistence_enabled)]);
    t.add_row(vec![Cell::new("System prompt"), flag(stats.system_prompt_set)]);
    t
}

pub fn search_table(res: &KnowledgeSearchResponse) -> Table {
    let mut t = table(&["#", "Score", "Source", "Content"]);
    for (i, r) in res.results.iter().enumerate() {
        let source = r
            .metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("—");
        t.add_row(vec![
            Cell::new(i + 1).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.3}", r.score)).set_alignment(CellAlignment::Right),
            Cell::new(source),
            Cell::new(&r.content),
        ]);
    }
    t
}
