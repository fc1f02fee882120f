//! HTTP client for the chat backend.
//!
//! One method per endpoint. Every method maps transport failures to
//! [`ClientError::Connect`], non-2xx replies to [`ClientError::Http`], and
//! undecodable bodies to [`ClientError::Decode`]; none of them retries.

use std::pin::Pin;

use bytes::Bytes;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_stream::Stream;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::stream::{EventReader, ImageRef};
use crate::wire::*;

/// Raw body chunks of a reply stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Percent-encode one URL path segment (RFC 3986 unreserved set kept).
pub fn encode_path_segment(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Cheap to clone; clones share connection pools.
#[derive(Clone)]
pub struct ChatClient {
    config: ClientConfig,
    /// Base URL with a trailing slash so relative joins keep any path prefix.
    base: Url,
    http: Client,
    streaming: Client,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base = Url::parse(&format!("{}/", config.base_url.trim_end_matches('/')))
            .map_err(|e| ClientError::Config(format!("invalid base URL {}: {e}", config.base_url)))?;
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("http client: {e}")))?;
        let streaming = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("stream client: {e}")))?;
        Ok(Self { config, base, http, streaming })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Absolute URL for a backend path. Absolute URLs pass through; paths
    /// resolve under the base URL, leading `/` or not.
    pub fn url(&self, path: &str) -> Result<Url> {
        if let Ok(absolute) = Url::parse(path) {
            return Ok(absolute);
        }
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::validation(format!("invalid URL {path}: {e}")))
    }

    fn chat_url(&self, session_id: &str, suffix: &str) -> Result<Url> {
        self.url(&format!("chat/{}{}", encode_path_segment(session_id), suffix))
    }

    async fn check(resp: reqwest::Result<Response>, url: &str) -> Result<Response> {
        let resp = resp.map_err(|e| ClientError::connect(url, e))?;
        if !resp.status().is_success() {
            return Err(ClientError::Http {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
        let bytes = resp.bytes().await.map_err(|e| ClientError::decode(what, e))?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::decode(what, e))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        let resp = Self::check(self.http.get(url.clone()).send().await, url.as_str()).await?;
        Self::decode(resp, what).await
    }

    async fn post_json<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<Response> {
        Self::check(self.http.post(url.clone()).json(body).send().await, url.as_str()).await
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    /// Persist a user message. Only the status is inspected.
    pub async fn post_message(&self, session_id: &str, message: &str, model: &str) -> Result<()> {
        let url = self.chat_url(session_id, "")?;
        let body = PostMessageRequest {
            message: message.to_string(),
            model: model.to_string(),
        };
        self.post_json(url, &body).await?;
        debug!(session_id, "user message persisted");
        Ok(())
    }

    /// Open the newline-delimited JSON reply stream.
    pub async fn open_stream(&self, session_id: &str, model: &str) -> Result<EventReader<ByteStream>> {
        let url = self.chat_url(session_id, "/stream")?;
        let resp = Self::check(
            self.streaming.get(url.clone()).query(&[("model", model)]).send().await,
            url.as_str(),
        )
        .await?;
        info!(session_id, "reply stream opened");
        let body: ByteStream = Box::pin(resp.bytes_stream());
        Ok(EventReader::new(body, url.as_str()))
    }

    /// Persist the streamed reply and get its canonical render.
    pub async fn finalize(
        &self,
        session_id: &str,
        content: &str,
        model: &str,
        images: Vec<ImageRef>,
    ) -> Result<FinalizeResponse> {
        let url = self.chat_url(session_id, "/finalize")?;
        let body = FinalizeRequest {
            content: content.to_string(),
            model: model.to_string(),
            images,
        };
        let resp = self.post_json(url, &body).await?;
        Self::decode(resp, "finalize response").await
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub async fn session_info(&self, session_id: &str) -> Result<SessionInfo> {
        let url = self.chat_url(session_id, "/info")?;
        self.get_json(url, "session info").await
    }

    pub async fn rename_session(&self, session_id: &str, title: &str) -> Result<()> {
        let url = self.chat_url(session_id, "/rename")?;
        self.post_json(url, &RenameRequest { title: title.to_string() }).await?;
        Ok(())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let url = self.chat_url(session_id, "")?;
        Self::check(self.http.delete(url.clone()).send().await, url.as_str()).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // MCP
    // -----------------------------------------------------------------------

    pub async fn mcp_servers(&self) -> Result<McpServersResponse> {
        self.get_json(self.url("mcp/servers")?, "MCP server list").await
    }

    pub async fn mcp_tools(&self, server: &str) -> Result<Vec<McpTool>> {
        let url = self.url(&format!("mcp/servers/{}/tools", encode_path_segment(server)))?;
        self.get_json(url, "MCP tool list").await
    }

    pub async fn run_mcp_tool(
        &self,
        server: &str,
        tool: &str,
        args: Map<String, Value>,
        session_id: Option<&str>,
    ) -> Result<RunToolResponse> {
        let url = self.url(&format!(
            "mcp/servers/{}/tools/{}",
            encode_path_segment(server),
            encode_path_segment(tool)
        ))?;
        let body = RunToolRequest {
            args,
            session_id: session_id.map(str::to_string),
        };
        let resp = self.post_json(url, &body).await?;
        Self::decode(resp, "tool result").await
    }

    pub async fn tool_selection(&self, session_id: &str) -> Result<ToolSelectionState> {
        let url = self.url("mcp/tools")?;
        let resp = Self::check(
            self.http.get(url.clone()).query(&[("session_id", session_id)]).send().await,
            url.as_str(),
        )
        .await?;
        Self::decode(resp, "tool selection").await
    }

    pub async fn apply_tool_selection(
        &self,
        request: &ToolSelectionRequest,
    ) -> Result<ToolSelectionState> {
        let url = self.url("mcp/tools/selection")?;
        let resp = self.post_json(url, request).await?;
        Self::decode(resp, "tool selection").await
    }

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    /// Load a generated image; success is the equivalent of a browser `load`.
    pub async fn fetch_image(&self, url: &str) -> Result<usize> {
        let url = self.url(url)?;
        let resp = Self::check(self.http.get(url.clone()).send().await, url.as_str()).await?;
        let body = resp.bytes().await.map_err(|e| ClientError::decode("image", e))?;
        Ok(body.len())
    }
}
