//! Client-side interaction layer for the Parlanchina chat backend.
//!
//! Sends user messages, reads the NDJSON reply stream, renders the reply
//! progressively to sanitized HTML, persists the final reply, and drives the
//! session list, tool selection, MCP runner, zoom viewer and theme widgets.

pub mod chat;
pub mod cli;
pub mod client;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod mcp;
pub mod modal;
pub mod render;
pub mod reply;
pub mod sessions;
pub mod stream;
pub mod terminal;
pub mod theme;
pub mod tools;
pub mod wire;

pub use chat::{ChatSession, Exchange, ReplyObserver};
pub use client::ChatClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use reply::{ReplyPhase, ReplyState};
pub use stream::{EventReader, StreamEvent};
