//! MCP tool runner panel: pick a server and a tool, pass JSON arguments, and
//! show the result.

use serde_json::{Map, Value};
use tracing::warn;

use crate::client::ChatClient;
use crate::error::{ClientError, Result};
use crate::render::render_markdown;
use crate::wire::{McpServer, McpServersResponse, McpTool, RunToolResponse};

/// One-line status shown above the controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub is_error: bool,
}

impl Status {
    fn ok(message: impl Into<String>) -> Self {
        Self { message: message.into(), is_error: false }
    }

    fn error(message: impl Into<String>) -> Self {
        Self { message: message.into(), is_error: true }
    }
}

/// Description block for the selected tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescription {
    pub description: String,
    /// Pretty-printed input schema; hidden when absent.
    pub schema: Option<String>,
}

impl ToolDescription {
    fn of(tool: Option<&McpTool>) -> Self {
        let description = tool
            .and_then(|t| t.description.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "No description provided.".to_string());
        let schema = tool
            .and_then(|t| t.input_schema.as_ref())
            .filter(|s| !s.is_null())
            .and_then(|s| serde_json::to_string_pretty(s).ok());
        Self { description, schema }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    Html(String),
    Text(String),
}

/// Parse the argument box: blank means `{}`, anything else must be a JSON
/// object.
pub fn parse_args(raw: &str) -> Result<Map<String, Value>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ClientError::validation("Arguments must be valid JSON")),
    }
}

/// Label for a server in the picker.
pub fn server_label(server: &McpServer) -> String {
    format!("{} ({})", server.name, server.transport)
}

#[derive(Debug, Clone)]
pub struct McpPanel {
    session_id: Option<String>,
    status: Status,
    controls_visible: bool,
    servers: Vec<McpServer>,
    selected_server: Option<String>,
    tools: Vec<McpTool>,
    selected_tool: Option<String>,
    description: Option<ToolDescription>,
    output: Option<ToolOutput>,
    appended: Vec<String>,
}

impl McpPanel {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            session_id,
            status: Status::ok(""),
            controls_visible: false,
            servers: Vec::new(),
            selected_server: None,
            tools: Vec::new(),
            selected_tool: None,
            description: None,
            output: None,
            appended: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Servers
    // -----------------------------------------------------------------------

    /// Returns the server whose tools should be loaded next, if any.
    pub fn apply_servers(&mut self, resp: McpServersResponse) -> Option<String> {
        if !resp.enabled {
            self.status = Status::error(resp.reason.unwrap_or_else(|| "MCP is disabled".to_string()));
            return None;
        }
        if resp.servers.is_empty() {
            self.status = Status::error("No MCP servers configured");
            return None;
        }
        self.controls_visible = true;
        self.selected_server = resp.servers.first().map(|s| s.name.clone());
        self.servers = resp.servers;
        self.status = Status::ok("Ready");
        self.selected_server.clone()
    }

    pub async fn load_servers(&mut self, client: &ChatClient) -> Result<()> {
        match client.mcp_servers().await {
            Ok(resp) => {
                if let Some(server) = self.apply_servers(resp) {
                    self.load_tools(client, &server).await?;
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "MCP server list failed");
                self.status = Status::error("Unable to load MCP servers");
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tools
    // -----------------------------------------------------------------------

    pub fn apply_tools(&mut self, server: &str, tools: Vec<McpTool>) {
        self.selected_server = Some(server.to_string());
        if tools.is_empty() {
            self.tools.clear();
            self.selected_tool = None;
            self.description = Some(ToolDescription::of(None));
            self.status = Status::error(format!("No tools available for {server}"));
            return;
        }
        self.description = Some(ToolDescription::of(tools.first()));
        self.selected_tool = tools.first().map(|t| t.name.clone());
        self.status = Status::ok(format!("Loaded {} tool(s)", tools.len()));
        self.tools = tools;
    }

    pub async fn load_tools(&mut self, client: &ChatClient, server: &str) -> Result<()> {
        if server.is_empty() {
            return Ok(());
        }
        self.status = Status::ok(format!("Loading tools for {server}…"));
        match client.mcp_tools(server).await {
            Ok(tools) => {
                self.apply_tools(server, tools);
                Ok(())
            }
            Err(e) => {
                warn!(server, error = %e, "MCP tool list failed");
                self.status = Status::error(format!("Unable to load tools for {server}"));
                Err(e)
            }
        }
    }

    /// Switch the selected tool and describe it.
    pub fn select_tool(&mut self, name: &str) -> bool {
        let Some(tool) = self.tools.iter().find(|t| t.name == name) else {
            return false;
        };
        self.description = Some(ToolDescription::of(Some(tool)));
        self.selected_tool = Some(name.to_string());
        true
    }

    // -----------------------------------------------------------------------
    // Run
    // -----------------------------------------------------------------------

    pub fn apply_run_result(&mut self, resp: RunToolResponse) {
        let display = resp.result.and_then(|r| r.display);
        let rendered = match &resp.message_html {
            Some(html) if !html.is_empty() => html.clone(),
            _ => display.as_deref().map(render_markdown).unwrap_or_default(),
        };
        self.output = Some(if rendered.trim().is_empty() {
            ToolOutput::Text(display.filter(|d| !d.is_empty()).unwrap_or_else(|| "Tool executed".to_string()))
        } else {
            ToolOutput::Html(rendered)
        });
        if let Some(html) = resp.message_html.filter(|h| !h.is_empty()) {
            self.appended.push(html);
        }
        self.status = Status::ok("Tool completed");
    }

    /// Validate arguments, run the selected tool, and show its output.
    ///
    /// Invalid JSON arguments fail before any request is sent.
    pub async fn run(&mut self, client: &ChatClient, raw_args: &str) -> Result<()> {
        let (Some(server), Some(tool)) = (self.selected_server.clone(), self.selected_tool.clone())
        else {
            return Ok(());
        };
        let args = match parse_args(raw_args) {
            Ok(args) => args,
            Err(e) => {
                self.status = Status::error(e.to_string());
                return Err(e);
            }
        };
        self.status = Status::ok(format!("Running {tool} on {server}…"));
        match client.run_mcp_tool(&server, &tool, args, self.session_id.as_deref()).await {
            Ok(resp) => {
                self.apply_run_result(resp);
                Ok(())
            }
            Err(e) => {
                warn!(server = %server, tool = %tool, error = %e, "tool run failed");
                self.status = Status::error("Tool execution failed");
                Err(e)
            }
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn controls_visible(&self) -> bool {
        self.controls_visible
    }

    pub fn servers(&self) -> &[McpServer] {
        &self.servers
    }

    pub fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    pub fn selected_server(&self) -> Option<&str> {
        self.selected_server.as_deref()
    }

    pub fn selected_tool(&self) -> Option<&str> {
        self.selected_tool.as_deref()
    }

    pub fn description(&self) -> Option<&ToolDescription> {
        self.description.as_ref()
    }

    pub fn output(&self) -> Option<&ToolOutput> {
        self.output.as_ref()
    }

    /// Assistant bubbles added to the conversation by tool runs.
    pub fn appended_messages(&self) -> &[String] {
        &self.appended
    }
}
