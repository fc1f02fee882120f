use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::theme::ThemePreference;
use crate::wire::ToolMode;

#[derive(Debug, Parser)]
#[command(name = "parlanchina")]
#[command(version)]
#[command(about = "Terminal client for the Parlanchina chat backend")]
pub struct Args {
    /// TOML config file (defaults to $PARLANCHINA_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL, overrides config and $PARLANCHINA_URL
    #[arg(long, global = true)]
    pub url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a message and stream the reply; without a message, read lines from stdin
    Chat {
        session: String,
        message: Option<String>,

        /// Model to answer with
        #[arg(long)]
        model: Option<String>,

        /// Print the persisted HTML instead of the plain reply
        #[arg(long)]
        html: bool,

        /// Messages already in the session (0 starts a title poll after the first reply)
        #[arg(long, default_value = "0")]
        existing: usize,

        /// Copy the saved reply to the clipboard
        #[arg(long)]
        copy: bool,
    },

    /// Rename a session
    Rename { session: String, title: String },

    /// Delete a session
    Delete {
        session: String,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,

        /// The session is the one currently open
        #[arg(long)]
        current: bool,
    },

    /// Show a session's title
    Info { session: String },

    /// Show or change which tools the assistant may use in a session
    Tools {
        session: String,

        #[arg(long, value_enum)]
        mode: Option<ToolMode>,

        #[arg(long = "enable-internal", value_name = "ID")]
        enable_internal: Vec<String>,

        #[arg(long = "disable-internal", value_name = "ID")]
        disable_internal: Vec<String>,

        #[arg(long = "enable-mcp", value_name = "ID")]
        enable_mcp: Vec<String>,

        #[arg(long = "disable-mcp", value_name = "ID")]
        disable_mcp: Vec<String>,
    },

    /// Browse and run MCP tools
    Mcp {
        #[command(subcommand)]
        command: McpCommand,
    },

    /// Show or set the saved theme
    Theme {
        #[arg(value_enum)]
        preference: Option<ThemePreference>,
    },

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum McpCommand {
    /// List configured MCP servers
    Servers,

    /// List a server's tools
    Tools { server: String },

    /// Run a tool
    Run {
        server: String,
        tool: String,

        /// JSON object of arguments
        #[arg(long, default_value = "")]
        args: String,

        /// Session to attach the result to
        #[arg(long)]
        session: Option<String>,
    },
}

impl Command {
    /// Whether any tool-selection change was requested.
    pub fn changes_tools(&self) -> bool {
        match self {
            Command::Tools { mode, enable_internal, disable_internal, enable_mcp, disable_mcp, .. } => {
                mode.is_some()
                    || !enable_internal.is_empty()
                    || !disable_internal.is_empty()
                    || !enable_mcp.is_empty()
                    || !disable_mcp.is_empty()
            }
            _ => false,
        }
    }
}
