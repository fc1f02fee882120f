use std::io;

use clap::{CommandFactory, Parser};
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use parlanchina_client::chat::ChatSession;
use parlanchina_client::cli::{Args, Command, McpCommand};
use parlanchina_client::clipboard::{
    copy_with_fallback, CopyFeedback, FileClipboard, NativeClipboard, Osc52Clipboard,
};
use parlanchina_client::client::ChatClient;
use parlanchina_client::config::ClientConfig;
use parlanchina_client::error::ClientError;
use parlanchina_client::mcp::{server_label, McpPanel, ToolOutput};
use parlanchina_client::sessions::{DeleteOutcome, SessionItem, SessionList, TitlePoller};
use parlanchina_client::terminal::{PromptConfirm, TerminalPresenter};
use parlanchina_client::theme::{system_prefers_dark, ThemeController, ThemePreference, ThemeStore};
use parlanchina_client::tools::ToolPanel;
use parlanchina_client::wire::ToolMode;

type AnyResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PARLANCHINA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Send one message. Returns the title poll started by a session's first
/// message, if any.
async fn send_one(
    chat: &mut ChatSession<'_>,
    message: &str,
    html: bool,
    copy: bool,
) -> AnyResult<Option<JoinHandle<u32>>> {
    let mut presenter = TerminalPresenter::new(io::stdout(), html);
    let Some(exchange) = chat.submit(message, &mut presenter).await? else {
        return Ok(None);
    };
    if let (true, Some(raw)) = (copy, exchange.reply.copy_text()) {
        copy_reply(raw);
    }
    if !exchange.first_message {
        return Ok(None);
    }
    Ok(Some(spawn_title_poll(chat.client().clone(), chat.session_id().to_string())))
}

/// Desktop clipboard first, then OSC 52, then a file in the temp directory.
fn copy_reply(raw: &str) {
    let mut native = NativeClipboard::new();
    let mut osc52 = Osc52Clipboard::new(io::stderr());
    let mut file = FileClipboard::new(std::env::temp_dir().join("parlanchina-copy.txt"));
    let outcome = copy_with_fallback(&mut native, &mut [&mut osc52, &mut file], raw);
    let now = std::time::Instant::now();
    let mut feedback = CopyFeedback::default();
    feedback.record(outcome, now);
    if outcome.succeeded() {
        eprintln!("{}", feedback.label(now).bright_green());
    }
}

/// Title generation runs on the backend after the first message; report the
/// title as it changes without blocking the conversation.
fn spawn_title_poll(client: ChatClient, session_id: String) -> JoinHandle<u32> {
    TitlePoller::from_config(client.config()).spawn(client, session_id, |title| {
        eprintln!("{} {}", "Title:".bright_yellow(), title.bright_white());
    })
}

/// Let a running title poll finish its window before the runtime shuts down.
async fn finish_title_poll(poll: Option<JoinHandle<u32>>) {
    let Some(poll) = poll else { return };
    match poll.await {
        Ok(polls) => debug!(polls, "title poll finished"),
        Err(e) => warn!(error = %e, "title poll task failed"),
    }
}

async fn chat(
    client: &ChatClient,
    session: String,
    message: Option<String>,
    model: Option<String>,
    html: bool,
    existing: usize,
    copy: bool,
) -> AnyResult {
    let mut chat = ChatSession::new(client, session).existing_messages(existing);
    if let Some(model) = model {
        chat = chat.model(model);
    }

    let mut title_poll = None;
    match message {
        Some(message) => title_poll = send_one(&mut chat, &message, html, copy).await?,
        None => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                match send_one(&mut chat, &line, html, copy).await {
                    Ok(Some(poll)) => title_poll = Some(poll),
                    Ok(None) => {}
                    Err(e) => eprintln!("{} {}", "error:".red().bold(), e),
                }
            }
        }
    }
    finish_title_poll(title_poll).await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

async fn rename(client: &ChatClient, session: String, title: String) -> AnyResult {
    let current = client.session_info(&session).await.map(|i| i.title).unwrap_or_default();
    let mut list = SessionList::new(vec![SessionItem::new(&session, current)], Some(session.clone()));
    list.rename(client, &session, &title).await?;
    println!("{} {}", "Renamed:".bright_green(), list.header_title().unwrap_or_default());
    Ok(())
}

async fn delete(client: &ChatClient, session: String, yes: bool, current: bool) -> AnyResult {
    let mut list = SessionList::new(
        vec![SessionItem::new(&session, "")],
        current.then(|| session.clone()),
    );
    let outcome = if yes {
        list.delete(client, &session, &mut |_: &str| true).await?
    } else {
        list.delete(client, &session, &mut PromptConfirm::stdio()).await?
    };
    match outcome {
        DeleteOutcome::Cancelled => return Err(ClientError::Cancelled.into()),
        DeleteOutcome::Removed => println!("{} {}", "Deleted".bright_green(), session),
        DeleteOutcome::Redirect(path) => {
            println!("{} {} {} {}", "Deleted".bright_green(), session, "→".dimmed(), path)
        }
    }
    Ok(())
}

async fn session_info(client: &ChatClient, session: String) -> AnyResult {
    let info = client.session_info(&session).await?;
    println!("{}: {}", "Title".bright_yellow(), info.title);
    if let Some(updated) = info.updated_at {
        println!("{}: {}", "Updated".bright_yellow(), updated);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tool selection
// ---------------------------------------------------------------------------

fn print_tool_panel(panel: &ToolPanel) {
    let applied = panel.applied();
    println!(
        "{}: {}   {}: {}",
        "Mode".bright_yellow(),
        applied.mode,
        "Enabled".bright_yellow(),
        panel.applied_count()
    );
    println!("{}", "Internal tools".bright_cyan().bold());
    for tool in panel.internal_tools() {
        let mark = if applied.internal.contains(&tool.id) { "[x]" } else { "[ ]" };
        println!("  {} {} {}", mark, tool.id, tool.description.dimmed());
    }
    println!("{}", "External tools".bright_cyan().bold());
    if let Some(reason) = panel.mcp_reason() {
        println!("  {}", reason.dimmed());
    }
    let usable = panel.applied_external_enabled();
    for tool in panel.mcp_tools() {
        let mark = if applied.mcp.contains(&tool.id) { "[x]" } else { "[ ]" };
        let line = format!("  {} {} {}", mark, tool.id, tool.description);
        if usable {
            println!("{line}");
        } else {
            println!("{}", line.dimmed());
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn tools(
    client: &ChatClient,
    session: String,
    mode: Option<ToolMode>,
    enable_internal: Vec<String>,
    disable_internal: Vec<String>,
    enable_mcp: Vec<String>,
    disable_mcp: Vec<String>,
    apply: bool,
) -> AnyResult {
    let mut panel = ToolPanel::new(session);
    panel.load(client).await?;
    if apply {
        if let Some(mode) = mode {
            panel.set_mode(mode);
        }
        let edits = enable_internal
            .iter()
            .map(|id| (false, id, true))
            .chain(disable_internal.iter().map(|id| (false, id, false)))
            .chain(enable_mcp.iter().map(|id| (true, id, true)))
            .chain(disable_mcp.iter().map(|id| (true, id, false)));
        for (external, id, enabled) in edits {
            let accepted = if external { panel.set_mcp(id, enabled) } else { panel.set_internal(id, enabled) };
            if !accepted {
                eprintln!("{} {}", "ignored:".yellow(), id);
            }
        }
        if panel.is_dirty() {
            panel.apply(client).await?;
            info!(enabled = panel.applied_count(), "tool selection updated");
        }
    }
    print_tool_panel(&panel);
    Ok(())
}

// ---------------------------------------------------------------------------
// MCP
// ---------------------------------------------------------------------------

fn print_status(panel: &McpPanel) {
    let status = panel.status();
    if status.is_error {
        eprintln!("{}", status.message.red());
    } else {
        eprintln!("{}", status.message.dimmed());
    }
}

async fn mcp(client: &ChatClient, command: McpCommand) -> AnyResult {
    match command {
        McpCommand::Servers => {
            let mut panel = McpPanel::new(None);
            let resp = client.mcp_servers().await;
            match resp {
                Ok(resp) => {
                    panel.apply_servers(resp);
                }
                Err(e) => {
                    eprintln!("{}", "Unable to load MCP servers".red());
                    return Err(e.into());
                }
            }
            print_status(&panel);
            for server in panel.servers() {
                println!("{}", server_label(server));
            }
        }
        McpCommand::Tools { server } => {
            let mut panel = McpPanel::new(None);
            let result = panel.load_tools(client, &server).await;
            print_status(&panel);
            result?;
            for tool in panel.tools() {
                println!("{}", tool.name.bright_white().bold());
                let description = tool.description.as_deref().unwrap_or("No description provided.");
                println!("  {}", description.dimmed());
            }
        }
        McpCommand::Run { server, tool, args, session } => {
            let mut panel = McpPanel::new(session);
            let loaded = panel.load_tools(client, &server).await;
            if let Err(e) = loaded {
                print_status(&panel);
                return Err(e.into());
            }
            if !panel.select_tool(&tool) {
                return Err(ClientError::validation(format!("No tool named {tool} on {server}")).into());
            }
            let result = panel.run(client, &args).await;
            print_status(&panel);
            result?;
            match panel.output() {
                Some(ToolOutput::Html(html)) => println!("{html}"),
                Some(ToolOutput::Text(text)) => println!("{text}"),
                None => {}
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Theme
// ---------------------------------------------------------------------------

fn theme(config: &ClientConfig, preference: Option<ThemePreference>) -> AnyResult {
    let path = config
        .theme_file
        .clone()
        .or_else(ThemeStore::default_path)
        .ok_or_else(|| ClientError::Config("no theme file location; set theme_file".into()))?;
    let store = ThemeStore::new(path);
    let mut controller = ThemeController::new(store.load(), system_prefers_dark());
    if let Some(pref) = preference {
        store.save(pref)?;
        controller.select(pref);
    }
    let applied = controller.applied();
    println!("{}: {}", "Saved".bright_yellow(), controller.saved());
    println!(
        "{}: {}   {}: {}",
        "Effective".bright_yellow(),
        if applied.is_dark() { "dark" } else { "light" },
        "Diagrams".bright_yellow(),
        applied.diagram_theme()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> AnyResult {
    init_tracing();
    let args = Args::parse();

    if let Command::Completions { shell } = args.command {
        clap_complete::generate(shell, &mut Args::command(), "parlanchina", &mut io::stdout());
        return Ok(());
    }

    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(url) = args.url {
        config = config.base_url(url);
    }
    debug!(base_url = %config.base_url, "config resolved");

    if let Command::Theme { preference } = args.command {
        return theme(&config, preference);
    }

    let client = ChatClient::new(config)?;
    let apply = args.command.changes_tools();
    match args.command {
        Command::Chat { session, message, model, html, existing, copy } => {
            chat(&client, session, message, model, html, existing, copy).await
        }
        Command::Rename { session, title } => rename(&client, session, title).await,
        Command::Delete { session, yes, current } => delete(&client, session, yes, current).await,
        Command::Info { session } => session_info(&client, session).await,
        Command::Tools { session, mode, enable_internal, disable_internal, enable_mcp, disable_mcp } => {
            tools(&client, session, mode, enable_internal, disable_internal, enable_mcp, disable_mcp, apply)
                .await
        }
        Command::Mcp { command } => mcp(&client, command).await,
        Command::Theme { .. } | Command::Completions { .. } => Ok(()),
    }
}
