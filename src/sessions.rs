//! Session List Controller: rename, delete and title sync for the sidebar.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::ChatClient;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::wire::SessionInfo;

/// Where the page goes after deleting the open session.
pub const HOME_PATH: &str = "/";

/// Asks the user to confirm destructive actions.
pub trait Confirm {
    fn confirm(&mut self, message: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, message: &str) -> bool {
        self(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionItem {
    pub id: String,
    pub title: String,
}

impl SessionItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The user declined; nothing was sent.
    Cancelled,
    /// The sidebar item was removed.
    Removed,
    /// The open session was deleted; navigate to the given path.
    Redirect(String),
}

/// Sidebar list plus the header of the currently open session.
#[derive(Debug, Clone, Default)]
pub struct SessionList {
    items: Vec<SessionItem>,
    current: Option<String>,
    editing: Option<String>,
}

impl SessionList {
    pub fn new(items: Vec<SessionItem>, current: Option<String>) -> Self {
        Self { items, current, editing: None }
    }

    pub fn items(&self) -> &[SessionItem] {
        &self.items
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn title_of(&self, id: &str) -> Option<&str> {
        self.items.iter().find(|s| s.id == id).map(|s| s.title.as_str())
    }

    /// Title shown in the page header (the open session's).
    pub fn header_title(&self) -> Option<&str> {
        self.current.as_deref().and_then(|id| self.title_of(id))
    }

    /// Open the inline editor; returns the text to pre-fill it with.
    pub fn begin_rename(&mut self, id: &str) -> Option<String> {
        let title = self.title_of(id)?.to_string();
        self.editing = Some(id.to_string());
        Some(title)
    }

    pub fn cancel_rename(&mut self) {
        self.editing = None;
    }

    pub fn editing(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    /// Set a title locally (rename echo or title poll).
    pub fn apply_title(&mut self, id: &str, title: &str) -> bool {
        match self.items.iter_mut().find(|s| s.id == id) {
            Some(item) if item.title != title => {
                item.title = title.to_string();
                true
            }
            _ => false,
        }
    }

    /// Validate, send, and on success update sidebar and header.
    ///
    /// A blank title fails with [`ClientError::Validation`] before any request.
    pub async fn rename(&mut self, client: &ChatClient, id: &str, title: &str) -> Result<()> {
        let title = validate_title(title)?;
        client.rename_session(id, &title).await?;
        self.apply_title(id, &title);
        self.editing = None;
        info!(session_id = id, title = %title, "session renamed");
        Ok(())
    }

    /// Confirm, send the delete, and drop the sidebar item.
    pub async fn delete<C: Confirm>(
        &mut self,
        client: &ChatClient,
        id: &str,
        confirm: &mut C,
    ) -> Result<DeleteOutcome> {
        if !confirm.confirm("Delete this chat? This cannot be undone.") {
            return Ok(DeleteOutcome::Cancelled);
        }
        client.delete_session(id).await?;
        Ok(self.remove(id))
    }

    /// Local half of a successful delete.
    pub fn remove(&mut self, id: &str) -> DeleteOutcome {
        self.items.retain(|s| s.id != id);
        if self.editing.as_deref() == Some(id) {
            self.editing = None;
        }
        if self.current.as_deref() == Some(id) {
            self.current = None;
            info!(session_id = id, "deleted open session, going home");
            DeleteOutcome::Redirect(HOME_PATH.to_string())
        } else {
            info!(session_id = id, "deleted session");
            DeleteOutcome::Removed
        }
    }
}

/// Trimmed title, or a validation error when nothing is left.
pub fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ClientError::validation("Title cannot be empty"));
    }
    Ok(title.to_string())
}

// ---------------------------------------------------------------------------
// Title poll
// ---------------------------------------------------------------------------

/// Polls session info after a session's first message so a title generated
/// in the background shows up.
///
/// The poll runs for the whole window even once a new title has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitlePoller {
    pub interval: Duration,
    pub max: Duration,
}

impl Default for TitlePoller {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max: Duration::from_secs(30),
        }
    }
}

impl TitlePoller {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            interval: config.title_poll_interval,
            max: config.title_poll_max,
        }
    }

    /// Number of polls in one window.
    pub fn poll_count(&self) -> u32 {
        if self.interval.is_zero() {
            return 0;
        }
        u32::try_from(self.max.as_nanos() / self.interval.as_nanos()).unwrap_or(u32::MAX)
    }

    /// Poll `/chat/{id}/info`, calling `on_title` whenever the title changes.
    pub async fn run<F: FnMut(&str)>(&self, client: &ChatClient, session_id: &str, on_title: F) -> u32 {
        self.run_with(|| client.session_info(session_id), on_title).await
    }

    /// Run the poll on its own task so the conversation is not blocked.
    ///
    /// The runtime drops unfinished tasks when it shuts down, so the handle
    /// has to be awaited before exiting for the poll to run its window.
    pub fn spawn<F>(self, client: ChatClient, session_id: String, on_title: F) -> JoinHandle<u32>
    where
        F: FnMut(&str) + Send + 'static,
    {
        tokio::spawn(async move { self.run(&client, &session_id, on_title).await })
    }

    /// Poll loop over any info source. Returns how many polls were made.
    pub async fn run_with<S, Fut, F>(&self, mut fetch: S, mut on_title: F) -> u32
    where
        S: FnMut() -> Fut,
        Fut: Future<Output = Result<SessionInfo>>,
        F: FnMut(&str),
    {
        let polls = self.poll_count();
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_title: Option<String> = None;

        for n in 0..polls {
            ticker.tick().await;
            match fetch().await {
                Ok(info) => {
                    if last_title.as_deref() != Some(info.title.as_str()) {
                        debug!(poll = n + 1, title = %info.title, "session title changed");
                        on_title(&info.title);
                        last_title = Some(info.title);
                    }
                }
                Err(e) => warn!(poll = n + 1, error = %e, "title poll failed"),
            }
        }
        polls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn list() -> SessionList {
        SessionList::new(
            vec![SessionItem::new("a", "New chat"), SessionItem::new("b", "Recipes")],
            Some("a".to_string()),
        )
    }

    #[test]
    fn test_header_title_follows_current_session() {
        assert_eq!(list().header_title(), Some("New chat"));
    }

    #[test]
    fn test_begin_rename_prefills_current_title() {
        let mut l = list();
        assert_eq!(l.begin_rename("b").as_deref(), Some("Recipes"));
        assert_eq!(l.editing(), Some("b"));
        l.cancel_rename();
        assert!(l.editing().is_none());
    }

    #[test]
    fn test_begin_rename_unknown_id_is_none() {
        assert!(list().begin_rename("zzz").is_none());
    }

    #[test]
    fn test_blank_title_fails_validation() {
        let err = validate_title("   \t").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(validate_title("  Trip  ").unwrap(), "Trip");
    }

    #[test]
    fn test_apply_title_updates_header_for_current() {
        let mut l = list();
        assert!(l.apply_title("a", "Trip to Lisbon"));
        assert_eq!(l.header_title(), Some("Trip to Lisbon"));
        assert!(!l.apply_title("a", "Trip to Lisbon"));
    }

    #[test]
    fn test_removing_open_session_redirects_home() {
        let mut l = list();
        assert_eq!(l.remove("a"), DeleteOutcome::Redirect("/".to_string()));
        assert!(l.current().is_none());
        assert_eq!(l.items().len(), 1);
    }

    #[test]
    fn test_removing_other_session_only_removes_item() {
        let mut l = list();
        assert_eq!(l.remove("b"), DeleteOutcome::Removed);
        assert_eq!(l.current(), Some("a"));
        assert_eq!(l.items().len(), 1);
    }

    #[test]
    fn test_poll_count_covers_window() {
        assert_eq!(TitlePoller::default().poll_count(), 15);
        let zero = TitlePoller { interval: Duration::ZERO, max: Duration::from_secs(30) };
        assert_eq!(zero.poll_count(), 0);
    }

    #[test]
    fn test_poll_count_sub_millisecond_interval() {
        let fast = TitlePoller { interval: Duration::from_micros(500), max: Duration::from_secs(30) };
        assert_eq!(fast.poll_count(), 60_000);
        let tiny = TitlePoller { interval: Duration::from_nanos(1), max: Duration::MAX };
        assert_eq!(tiny.poll_count(), u32::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_keeps_running_after_title_arrives() {
        let calls = Cell::new(0u32);
        let mut titles = Vec::new();
        let started = Instant::now();
        let polls = TitlePoller::default()
            .run_with(
                || {
                    calls.set(calls.get() + 1);
                    let title = if calls.get() == 1 { "New chat" } else { "Trip to Lisbon" };
                    async move { Ok(SessionInfo { id: None, title: title.to_string(), updated_at: None }) }
                },
                |t| titles.push(t.to_string()),
            )
            .await;
        assert_eq!(polls, 15);
        assert_eq!(calls.get(), 15);
        assert_eq!(titles, vec!["New chat".to_string(), "Trip to Lisbon".to_string()]);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_survives_errors() {
        let calls = Cell::new(0u32);
        let polls = TitlePoller { interval: Duration::from_secs(2), max: Duration::from_secs(6) }
            .run_with(
                || {
                    calls.set(calls.get() + 1);
                    async { Err(ClientError::Http { status: 500, url: "x".into() }) }
                },
                |_| panic!("no title expected"),
            )
            .await;
        assert_eq!(polls, 3);
        assert_eq!(calls.get(), 3);
    }
}
