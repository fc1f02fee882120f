//! Terminal presentation of a chat exchange.
//!
//! [`TerminalPresenter`] turns the stream of re-renders into incremental
//! output: new text is appended as it arrives, status changes print once on
//! their own line, and the final state prints either the canonical HTML or a
//! short footer.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};

use colored::*;

use crate::chat::ReplyObserver;
use crate::render::MessageView;
use crate::reply::{ImageStatus, ReplyPhase, ReplyState};
use crate::sessions::Confirm;

pub struct TerminalPresenter<W: Write> {
    out: W,
    /// Print the canonical HTML instead of the raw text footer.
    html: bool,
    printed: String,
    thinking_shown: bool,
    image_notice: bool,
    diagram_notice: bool,
    failure_shown: bool,
    reported_images: HashSet<String>,
    finished: bool,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W, html: bool) -> Self {
        Self {
            out,
            html,
            printed: String::new(),
            thinking_shown: false,
            image_notice: false,
            diagram_notice: false,
            failure_shown: false,
            reported_images: HashSet::new(),
            finished: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn status_line(&mut self, line: &str) -> io::Result<()> {
        if !self.printed.is_empty() && !self.printed.ends_with('\n') {
            writeln!(self.out)?;
            self.printed.push('\n');
        }
        writeln!(self.out, "{line}")?;
        self.printed.clear();
        Ok(())
    }

    /// A status line in the middle of the reply; the reply text continues
    /// after it without being printed again.
    fn notice(&mut self, line: &str, state: &ReplyState) -> io::Result<()> {
        self.status_line(line)?;
        self.printed = state.text().to_string();
        Ok(())
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        if let Some(suffix) = text.strip_prefix(self.printed.as_str()) {
            write!(self.out, "{suffix}")?;
        } else {
            // The buffer was replaced wholesale (text_done); print it again.
            writeln!(self.out)?;
            write!(self.out, "{text}")?;
        }
        self.printed = text.to_string();
        self.out.flush()
    }

    fn render(&mut self, view: &MessageView, state: &ReplyState) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        match state.phase() {
            ReplyPhase::Streaming => {
                if let Some(failure) = state.failure() {
                    if !self.failure_shown {
                        self.failure_shown = true;
                        self.status_line(&failure.message.red().to_string())?;
                        if let Some(analysis) = &failure.analysis {
                            self.status_line(&analysis.dimmed().to_string())?;
                        }
                    }
                    return Ok(());
                }
                if state.text().trim().is_empty() && !state.is_rendering_image() {
                    if !self.thinking_shown {
                        self.thinking_shown = true;
                        self.status_line(&"Thinking...".dimmed().to_string())?;
                    }
                } else {
                    self.write_text(state.text())?;
                }
                if state.is_rendering_image() && !self.image_notice {
                    self.image_notice = true;
                    self.notice(&"[Generating image…]".dimmed().to_string(), state)?;
                }
                if !state.is_rendering_image() {
                    self.image_notice = false;
                }
                if view.flags.mermaid_pending && !self.diagram_notice {
                    self.diagram_notice = true;
                    self.notice(&"[Rendering diagram…]".dimmed().to_string(), state)?;
                }
                self.report_images(state)?;
            }
            ReplyPhase::StreamFailed => {
                self.finished = true;
                self.status_line(&"Error streaming response.".red().to_string())?;
            }
            ReplyPhase::SaveFailed => {
                self.finished = true;
                self.status_line(&"Failed to save response.".red().to_string())?;
            }
            ReplyPhase::Finalized { html, raw } => {
                self.finished = true;
                if self.html {
                    self.status_line(html)?;
                } else {
                    if !self.failure_shown {
                        self.write_text(raw)?;
                    }
                    self.status_line("")?;
                    self.status_line(&format!("{} {}", "✓".bright_green(), "saved".dimmed()))?;
                }
            }
        }
        self.out.flush()
    }

    fn report_images(&mut self, state: &ReplyState) -> io::Result<()> {
        for image in state.images() {
            if self.reported_images.contains(&image.url) {
                continue;
            }
            let line = match image.status() {
                ImageStatus::Pending => continue,
                ImageStatus::Done => format!("[{} {}]", "image ready:".bright_green(), image.url),
                ImageStatus::Failed => format!("[{} {}]", "Failed to load image:".red(), image.url),
            };
            self.reported_images.insert(image.url.clone());
            self.notice(&line, state)?;
        }
        Ok(())
    }
}

impl<W: Write> ReplyObserver for TerminalPresenter<W> {
    fn on_user_message(&mut self, text: &str, _html: &str) {
        let _ = writeln!(self.out, "{} {}", "You:".bright_cyan().bold(), text);
        let _ = write!(self.out, "{} ", "Assistant:".bright_magenta().bold());
        let _ = self.out.flush();
    }

    fn on_render(&mut self, view: &MessageView, state: &ReplyState) {
        if let Err(e) = self.render(view, state) {
            tracing::warn!(error = %e, "terminal write failed");
        }
    }
}

/// `[y/N]` prompt over any reader/writer pair.
pub struct PromptConfirm<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl PromptConfirm<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirm<R, W> {
    fn confirm(&mut self, message: &str) -> bool {
        if write!(self.output, "{message} [y/N] ").and_then(|_| self.output.flush()).is_err() {
            return false;
        }
        let mut answer = String::new();
        if self.input.read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamEvent;

    fn plain() {
        colored::control::set_override(false);
    }

    fn drive(events: Vec<StreamEvent>) -> (TerminalPresenter<Vec<u8>>, ReplyState) {
        plain();
        let mut presenter = TerminalPresenter::new(Vec::new(), false);
        let mut state = ReplyState::new();
        presenter.on_render(&state.view(), &state);
        for event in events {
            state.apply(event);
            presenter.on_render(&state.view(), &state);
        }
        (presenter, state)
    }

    fn output(presenter: TerminalPresenter<Vec<u8>>) -> String {
        String::from_utf8(presenter.into_inner()).unwrap()
    }

    #[test]
    fn test_text_after_image_notice_is_not_reprinted() {
        let (presenter, _) = drive(vec![
            StreamEvent::TextDelta { text: "Hello".into() },
            StreamEvent::ImageStart,
            StreamEvent::TextDelta { text: " world".into() },
        ]);
        let out = output(presenter);
        assert!(out.contains("[Generating image…]"), "{out}");
        assert_eq!(out.matches("Hello").count(), 1, "{out}");
        assert!(out.contains(" world"), "{out}");
    }

    #[test]
    fn test_deltas_are_appended_once() {
        let (presenter, _) = drive(vec![
            StreamEvent::TextDelta { text: "Hi".into() },
            StreamEvent::TextDelta { text: " there".into() },
        ]);
        let out = output(presenter);
        assert!(out.contains("Thinking..."));
        assert_eq!(out.matches("Hi there").count(), 1, "{out}");
    }

    #[test]
    fn test_finalize_prints_footer() {
        let (mut presenter, mut state) = drive(vec![StreamEvent::TextDelta { text: "Hi".into() }]);
        state.finalize("<p>Hi</p>".into(), "Hi".into());
        presenter.on_render(&state.view(), &state);
        let out = output(presenter);
        assert!(out.contains("saved"));
        assert_eq!(out.matches("Hi").count(), 1, "{out}");
    }

    #[test]
    fn test_html_mode_prints_canonical_html() {
        plain();
        let mut presenter = TerminalPresenter::new(Vec::new(), true);
        let mut state = ReplyState::new();
        state.finalize("<p>Hi</p>".into(), "Hi".into());
        presenter.on_render(&state.view(), &state);
        assert!(output(presenter).contains("<p>Hi</p>"));
    }

    #[test]
    fn test_stream_failure_prints_once_and_stops() {
        let (mut presenter, mut state) = drive(vec![]);
        state.stream_failed();
        presenter.on_render(&state.view(), &state);
        presenter.on_render(&state.view(), &state);
        let out = output(presenter);
        assert_eq!(out.matches("Error streaming response.").count(), 1);
    }

    #[test]
    fn test_in_band_error_shows_message() {
        let (presenter, _) = drive(vec![StreamEvent::Error {
            message: Some("quota exceeded".into()),
            analysis: None,
            markdown: None,
        }]);
        assert!(output(presenter).contains("quota exceeded"));
    }

    #[test]
    fn test_confirm_accepts_yes_only() {
        let mut yes = PromptConfirm::new(&b"y\n"[..], Vec::new());
        assert!(yes.confirm("Delete?"));
        let mut no = PromptConfirm::new(&b"\n"[..], Vec::new());
        assert!(!no.confirm("Delete?"));
    }
}
