//! Copy-to-clipboard with fallbacks and transient button feedback.
//!
//! The desktop clipboard is tried first, then the terminal's OSC 52
//! clipboard (works over SSH), then a file.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use base64::Engine;
use tracing::{debug, warn};

pub const COPY_LABEL: &str = "Copy";
pub const COPIED_LABEL: &str = "Copied";
pub const FEEDBACK_DURATION: Duration = Duration::from_secs(2);

/// A place text can be copied to.
pub trait Clipboard {
    fn write_text(&mut self, text: &str) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// The primary clipboard failed; a fallback worked.
    CopiedFallback,
    /// Every backend failed; the failure was logged and nothing else happens.
    Failed,
}

impl CopyOutcome {
    pub fn succeeded(self) -> bool {
        self != CopyOutcome::Failed
    }
}

/// Try `primary`, then each fallback in order until one takes the text.
pub fn copy_with_fallback(
    primary: &mut dyn Clipboard,
    fallbacks: &mut [&mut dyn Clipboard],
    text: &str,
) -> CopyOutcome {
    match primary.write_text(text) {
        Ok(()) => return CopyOutcome::Copied,
        Err(e) => debug!(error = %e, "primary clipboard failed, trying fallback"),
    }
    for (i, fallback) in fallbacks.iter_mut().enumerate() {
        match fallback.write_text(text) {
            Ok(()) => return CopyOutcome::CopiedFallback,
            Err(e) => debug!(error = %e, fallback = i, "clipboard fallback failed"),
        }
    }
    warn!("copy failed");
    CopyOutcome::Failed
}

/// The desktop clipboard. Creation fails without a display server, in which
/// case every write fails and the fallbacks take over.
pub struct NativeClipboard {
    inner: Option<arboard::Clipboard>,
}

impl NativeClipboard {
    pub fn new() -> Self {
        let inner = match arboard::Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(e) => {
                debug!(error = %e, "native clipboard unavailable");
                None
            }
        };
        Self { inner }
    }

    pub fn is_available(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for NativeClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Clipboard for NativeClipboard {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        let clipboard = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no native clipboard"))?;
        clipboard.set_text(text).map_err(io::Error::other)
    }
}

/// Terminal clipboard via the OSC 52 escape sequence.
pub struct Osc52Clipboard<W: Write> {
    out: W,
}

impl<W: Write> Osc52Clipboard<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Clipboard for Osc52Clipboard<W> {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        let payload = base64::engine::general_purpose::STANDARD.encode(text);
        write!(self.out, "\x1b]52;c;{payload}\x07")?;
        self.out.flush()
    }
}

/// Last-resort fallback that drops the text into a file.
#[derive(Debug, Clone)]
pub struct FileClipboard {
    path: PathBuf,
}

impl FileClipboard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Clipboard for FileClipboard {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        std::fs::write(&self.path, text)
    }
}

/// Copy button label: "Copied" for two seconds after a successful copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyFeedback {
    copied_at: Option<Instant>,
}

impl CopyFeedback {
    pub fn record(&mut self, outcome: CopyOutcome, now: Instant) {
        if outcome.succeeded() {
            self.copied_at = Some(now);
        }
    }

    pub fn label(&self, now: Instant) -> &'static str {
        match self.copied_at {
            Some(at) if now.saturating_duration_since(at) < FEEDBACK_DURATION => COPIED_LABEL,
            _ => COPY_LABEL,
        }
    }
}
