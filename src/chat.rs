//! Chat driver: submit → persist → stream → finalize.
//!
//! [`ChatSession::submit`] runs the whole lifecycle of one exchange and
//! reports every re-render to a [`ReplyObserver`]. Events are dispatched
//! strictly in arrival order; the reader awaits each chunk before decoding
//! the next, so nothing is reordered or batched.

use tracing::{info, warn};

use crate::client::ChatClient;
use crate::error::Result;
use crate::render::{render_user_message, MessageView};
use crate::reply::{Dispatch, ReplyState};
use crate::stream::StreamEvent;

/// Receives the view of the bubbles as they change.
pub trait ReplyObserver {
    /// The user's message was accepted and shown.
    fn on_user_message(&mut self, _text: &str, _html: &str) {}

    /// The assistant bubble changed.
    fn on_render(&mut self, view: &MessageView, state: &ReplyState);
}

/// Observer that keeps only the latest view.
#[derive(Debug, Default)]
pub struct LastView {
    pub renders: usize,
    pub user_html: Option<String>,
    pub view: Option<MessageView>,
}

impl ReplyObserver for LastView {
    fn on_user_message(&mut self, _text: &str, html: &str) {
        self.user_html = Some(html.to_string());
    }

    fn on_render(&mut self, view: &MessageView, _state: &ReplyState) {
        self.renders += 1;
        self.view = Some(view.clone());
    }
}

/// Result of one submitted message.
#[derive(Debug)]
pub struct Exchange {
    pub reply: ReplyState,
    /// True when this was the session's first message (title generation
    /// starts on the backend, so a title poll is worthwhile).
    pub first_message: bool,
}

pub struct ChatSession<'a> {
    client: &'a ChatClient,
    session_id: String,
    model: String,
    message_count: usize,
    load_images: bool,
}

impl<'a> ChatSession<'a> {
    pub fn new(client: &'a ChatClient, session_id: impl Into<String>) -> Self {
        Self {
            model: client.config().model.clone(),
            client,
            session_id: session_id.into(),
            message_count: 0,
            load_images: true,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Number of messages already in the session when it was opened.
    pub fn existing_messages(mut self, count: usize) -> Self {
        self.message_count = count;
        self
    }

    /// Whether generated images are fetched to confirm they load.
    pub fn load_images(mut self, enabled: bool) -> Self {
        self.load_images = enabled;
        self
    }

    pub fn client(&self) -> &'a ChatClient {
        self.client
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send `message` and stream the assistant's reply.
    ///
    /// A blank message sends nothing and returns `Ok(None)`. A failure to
    /// persist the user message is returned as an error; failures after that
    /// are contained in the returned [`ReplyState`].
    pub async fn submit<O: ReplyObserver>(
        &mut self,
        message: &str,
        observer: &mut O,
    ) -> Result<Option<Exchange>> {
        let content = message.trim();
        if content.is_empty() {
            return Ok(None);
        }
        observer.on_user_message(content, &render_user_message(content));

        self.client.post_message(&self.session_id, content, &self.model).await?;
        let first_message = self.message_count == 0;
        self.message_count += 1;

        let reply = self.stream_reply(observer).await;
        self.message_count += 1;
        Ok(Some(Exchange { reply, first_message }))
    }

    /// Stream, dispatch and finalize one assistant reply.
    pub async fn stream_reply<O: ReplyObserver>(&self, observer: &mut O) -> ReplyState {
        let mut state = ReplyState::new();
        observer.on_render(&state.view(), &state);

        let mut reader = match self.client.open_stream(&self.session_id, &self.model).await {
            Ok(reader) => reader,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "could not open reply stream");
                state.stream_failed();
                observer.on_render(&state.view(), &state);
                return state;
            }
        };

        while let Some(next) = reader.next_event().await {
            let event = match next {
                Ok(event) => event,
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "reply stream broke");
                    state.stream_failed();
                    observer.on_render(&state.view(), &state);
                    return state;
                }
            };
            let image_url = match &event {
                StreamEvent::Image { url, .. } => Some(url.clone()),
                _ => None,
            };
            if state.apply(event) == Dispatch::Rerender {
                observer.on_render(&state.view(), &state);
            }
            if let (Some(url), true) = (image_url, self.load_images) {
                self.load_image(&mut state, &url, observer).await;
            }
        }

        self.finalize(&mut state).await;
        observer.on_render(&state.view(), &state);
        state
    }

    async fn load_image<O: ReplyObserver>(&self, state: &mut ReplyState, url: &str, observer: &mut O) {
        let changed = match self.client.fetch_image(url).await {
            Ok(_) => state.mark_image_loaded(url),
            Err(e) => {
                warn!(url, error = %e, "generated image failed to load");
                state.mark_image_failed(url)
            }
        };
        if changed {
            observer.on_render(&state.view(), state);
        }
    }

    async fn finalize(&self, state: &mut ReplyState) {
        let result = self
            .client
            .finalize(&self.session_id, state.text(), &self.model, state.collected_images())
            .await;
        match result {
            Ok(canonical) => {
                info!(session_id = %self.session_id, chars = canonical.raw.len(), "reply finalized");
                state.finalize(canonical.html, canonical.raw);
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "finalize failed");
                state.finalize_failed();
            }
        }
    }
}
