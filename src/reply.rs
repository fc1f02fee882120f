//! Event Dispatcher and per-reply state.
//!
//! A [`ReplyState`] is created when a stream opens and lives until finalize.
//! It owns the response buffer, the generated-image list, and the transient
//! flags that decide which overlays are visible. Every dispatched event leaves
//! the state ready for a fresh [`ReplyState::view`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::render::{
    escape_html, render_reply, MessageView, ViewFlags, SAVE_FAILED_HTML, STREAM_FAILED_HTML,
};
use crate::stream::{ImageRef, StreamEvent};

// ---------------------------------------------------------------------------
// Response buffer
// ---------------------------------------------------------------------------

/// Append-only reply text. Only [`ResponseBuffer::overwrite`] may shrink it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseBuffer {
    text: String,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Adopt `full` as the buffer if it is at least as long as the current
    /// text. Returns whether it was adopted.
    pub fn extend_to(&mut self, full: &str) -> bool {
        if full.len() >= self.text.len() {
            self.text.clear();
            self.text.push_str(full);
            true
        } else {
            false
        }
    }

    /// Replace the text unconditionally (finalize only).
    pub fn overwrite(&mut self, canonical: impl Into<String>) {
        self.text = canonical.into();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Generated images
// ---------------------------------------------------------------------------

/// Load state of a generated image. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    pub url: String,
    pub alt_text: String,
    status: ImageStatus,
}

impl PendingImage {
    pub fn new(url: impl Into<String>, alt_text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alt_text: alt_text.into(),
            status: ImageStatus::Pending,
        }
    }

    /// An image the backend already reports as stored.
    pub fn done(image: ImageRef) -> Self {
        Self {
            url: image.url,
            alt_text: image.alt_text,
            status: ImageStatus::Done,
        }
    }

    pub fn status(&self) -> ImageStatus {
        self.status
    }

    /// Pending → Done. Returns `false` when the image was not pending.
    pub fn mark_done(&mut self) -> bool {
        if self.status == ImageStatus::Pending {
            self.status = ImageStatus::Done;
            true
        } else {
            false
        }
    }

    /// Pending → Failed. Returns `false` when the image was not pending.
    pub fn mark_failed(&mut self) -> bool {
        if self.status == ImageStatus::Pending {
            self.status = ImageStatus::Failed;
            true
        } else {
            false
        }
    }

    pub fn to_ref(&self) -> ImageRef {
        ImageRef {
            url: self.url.clone(),
            alt_text: self.alt_text.clone(),
        }
    }
}

/// Markdown appended to the buffer for an `image` event without its own.
pub fn image_markdown(url: &str, alt_text: &str) -> String {
    format!("\n\n![{alt_text}]({url})\n")
}

// ---------------------------------------------------------------------------
// Reply state
// ---------------------------------------------------------------------------

/// Error reported in-band by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    pub message: String,
    pub analysis: Option<String>,
}

/// Lifecycle of one assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPhase {
    Streaming,
    /// The transport broke before the stream ended.
    StreamFailed,
    /// Persisted; `html` is the server-sanitized canonical render.
    Finalized { html: String, raw: String },
    SaveFailed,
}

/// What a dispatched event did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Rerender,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ReplyState {
    buffer: ResponseBuffer,
    images: Vec<PendingImage>,
    rendering_image: bool,
    failure: Option<StreamFailure>,
    phase: ReplyPhase,
}

impl Default for ReplyState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyState {
    pub fn new() -> Self {
        Self {
            buffer: ResponseBuffer::new(),
            images: Vec::new(),
            rendering_image: false,
            failure: None,
            phase: ReplyPhase::Streaming,
        }
    }

    /// Route one stream record to its handler.
    pub fn apply(&mut self, event: StreamEvent) -> Dispatch {
        if self.phase != ReplyPhase::Streaming {
            warn!(kind = event.kind(), "event after stream lifecycle ended, ignoring");
            return Dispatch::Ignored;
        }
        match event {
            StreamEvent::TextDelta { text } => {
                self.buffer.push_str(&text);
            }
            StreamEvent::ImageStart => {
                self.rendering_image = true;
            }
            StreamEvent::Image { url, alt_text, markdown } => {
                let addition = markdown.unwrap_or_else(|| image_markdown(&url, &alt_text));
                self.buffer.push_str(&addition);
                self.rendering_image = false;
                self.images.push(PendingImage::new(url, alt_text));
            }
            StreamEvent::TextDone { text, images } => {
                if let Some(text) = text {
                    if !self.buffer.extend_to(&text) {
                        debug!(
                            buffered = self.buffer.len(),
                            final_len = text.len(),
                            "text_done shorter than buffer, keeping buffer"
                        );
                    }
                }
                if let Some(images) = images {
                    self.images = images.into_iter().map(PendingImage::done).collect();
                }
            }
            StreamEvent::Error { message, analysis, markdown } => {
                let message = message.unwrap_or_else(|| "LLM error".to_string());
                warn!(error = %message, "backend reported stream error");
                if let Some(markdown) = markdown {
                    self.buffer.push_str(&markdown);
                }
                self.rendering_image = false;
                self.failure = Some(StreamFailure { message, analysis });
            }
            StreamEvent::Unknown => return Dispatch::Ignored,
        }
        Dispatch::Rerender
    }

    /// Browser-side image load: flips the matching pending record to done.
    pub fn mark_image_loaded(&mut self, url: &str) -> bool {
        self.images
            .iter_mut()
            .find(|img| img.url == url && img.status() == ImageStatus::Pending)
            .map(PendingImage::mark_done)
            .unwrap_or(false)
    }

    /// Browser-side image error: the overlay switches to a failure message.
    pub fn mark_image_failed(&mut self, url: &str) -> bool {
        self.images
            .iter_mut()
            .find(|img| img.url == url && img.status() == ImageStatus::Pending)
            .map(PendingImage::mark_failed)
            .unwrap_or(false)
    }

    /// The transport failed; the bubble shows a static error.
    pub fn stream_failed(&mut self) {
        self.phase = ReplyPhase::StreamFailed;
        self.clear_progress();
    }

    /// Adopt the persisted canonical reply.
    pub fn finalize(&mut self, html: String, raw: String) {
        self.buffer.overwrite(raw.clone());
        self.phase = ReplyPhase::Finalized { html, raw };
        self.clear_progress();
    }

    /// Persisting failed; the bubble shows a static error.
    pub fn finalize_failed(&mut self) {
        self.phase = ReplyPhase::SaveFailed;
        self.clear_progress();
    }

    fn clear_progress(&mut self) {
        self.rendering_image = false;
        for img in &mut self.images {
            img.mark_done();
        }
    }

    pub fn text(&self) -> &str {
        self.buffer.as_str()
    }

    pub fn images(&self) -> &[PendingImage] {
        &self.images
    }

    /// Images to send along with finalize.
    pub fn collected_images(&self) -> Vec<ImageRef> {
        self.images.iter().map(PendingImage::to_ref).collect()
    }

    pub fn phase(&self) -> &ReplyPhase {
        &self.phase
    }

    pub fn failure(&self) -> Option<&StreamFailure> {
        self.failure.as_ref()
    }

    pub fn is_rendering_image(&self) -> bool {
        self.rendering_image
    }

    /// Canonical raw text kept for the copy affordance, once finalized.
    pub fn copy_text(&self) -> Option<&str> {
        match &self.phase {
            ReplyPhase::Finalized { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// Current bubble contents.
    pub fn view(&self) -> MessageView {
        match &self.phase {
            ReplyPhase::Streaming => match &self.failure {
                Some(failure) => {
                    let mut html = format!(
                        r#"<p class="text-sm text-red-500">{}</p>"#,
                        escape_html(&failure.message)
                    );
                    if let Some(analysis) = &failure.analysis {
                        html.push_str(&format!("<p>{}</p>", escape_html(analysis)));
                    }
                    MessageView { html, flags: ViewFlags::cleared() }
                }
                None => render_reply(self.buffer.as_str(), &self.images, self.rendering_image),
            },
            ReplyPhase::StreamFailed => MessageView {
                html: STREAM_FAILED_HTML.to_string(),
                flags: ViewFlags::cleared(),
            },
            ReplyPhase::Finalized { html, .. } => MessageView {
                html: html.clone(),
                flags: ViewFlags::cleared(),
            },
            ReplyPhase::SaveFailed => MessageView {
                html: SAVE_FAILED_HTML.to_string(),
                flags: ViewFlags::cleared(),
            },
        }
    }
}
