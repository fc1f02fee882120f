//! Request and response bodies of the chat backend's HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::stream::ImageRef;

// -- Chat -------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct PostMessageRequest {
    pub message: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct FinalizeRequest {
    pub content: String,
    pub model: String,
    pub images: Vec<ImageRef>,
}

/// Canonical render of a persisted assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FinalizeResponse {
    pub html: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RenameRequest {
    pub title: String,
}

// -- MCP servers and tools --------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct McpServer {
    pub name: String,
    pub transport: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct McpServersResponse {
    pub enabled: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub servers: Vec<McpServer>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RunToolRequest {
    pub args: Map<String, Value>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolRunResult {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunToolResponse {
    #[serde(default)]
    pub result: Option<ToolRunResult>,
    #[serde(default)]
    pub message_html: Option<String>,
}

// -- Tool selection ---------------------------------------------------------

/// Conversation mode. External (MCP) tools are only usable in `Agent`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    #[default]
    Ask,
    Agent,
}

impl std::fmt::Display for ToolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolMode::Ask => write!(f, "ask"),
            ToolMode::Agent => write!(f, "agent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InternalToolEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct McpToolEntry {
    pub server: String,
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub applied: bool,
}

/// Tool catalogue plus the applied selection for one session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolSelectionState {
    #[serde(default)]
    pub mode: ToolMode,
    #[serde(default)]
    pub internal: Vec<InternalToolEntry>,
    #[serde(default)]
    pub mcp: Vec<McpToolEntry>,
    #[serde(default)]
    pub mcp_enabled: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSelectionRequest {
    pub session_id: String,
    pub mode: ToolMode,
    pub enabled_internal_tools: Vec<String>,
    pub enabled_mcp_tools: Vec<String>,
}
