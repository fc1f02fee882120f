//! Render Pipeline: reply markdown → sanitized, decorated HTML.
//!
//! Every mutation of a reply re-renders the whole buffer from scratch. The
//! decorations (diagram container + zoom control + cached source, image
//! container + zoom control + load overlay) are emitted while walking the
//! markdown events, so a re-render can never double-wrap an element and no
//! "already decorated" bookkeeping exists.

use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use serde::Serialize;

use crate::reply::{ImageStatus, PendingImage};

/// Shown in a fresh assistant bubble before anything has been rendered.
pub const THINKING_HTML: &str = r#"<p class="text-sm text-slate-500">Thinking...</p>"#;
/// Provisional caption while the model is producing an image.
pub const IMAGE_PROGRESS_HTML: &str = r#"<p class="image-progress">Generating image…</p>"#;
/// Replaces the bubble when finalize fails.
pub const SAVE_FAILED_HTML: &str = r#"<p class="text-sm text-red-500">Failed to save response.</p>"#;
/// Replaces the bubble when the stream cannot be read.
pub const STREAM_FAILED_HTML: &str = r#"<p class="text-sm text-red-500">Error streaming response.</p>"#;

const ZOOM_ICON_SVG: &str = r#"<svg class="w-5 h-5" fill="none" stroke="currentColor" viewBox="0 0 24 24"><path stroke-linecap="round" stroke-linejoin="round" stroke-width="2" d="M21 21l-6-6m2-5a7 7 0 11-14 0 7 7 0 0114 0zM10 7v3m0 0v3m0-3h3m-3 0H7"/></svg>"#;

// ---------------------------------------------------------------------------
// Fence predicates
// ---------------------------------------------------------------------------

/// A fence line: up to three spaces, then a run of three or more backticks or
/// tildes, then the info string (or nothing, for a closer).
static FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})(.*)$").expect("valid fence regex"));

#[derive(Debug, Clone, Copy)]
struct OpenFence {
    marker: u8,
    len: usize,
    diagram: bool,
}

/// Walk the fenced code blocks of `text` with CommonMark's fence rules.
/// Returns the number of diagram fences opened and the fence still open at
/// the end, if any.
fn scan_fences(text: &str) -> (usize, Option<OpenFence>) {
    let mut diagrams = 0;
    let mut open: Option<OpenFence> = None;
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some(caps) = FENCE_LINE.captures(line) else {
            continue;
        };
        let run = &caps[1];
        let rest = caps[2].trim();
        let marker = run.as_bytes()[0];
        match open {
            Some(fence) => {
                if marker == fence.marker && run.len() >= fence.len && rest.is_empty() {
                    open = None;
                }
            }
            None => {
                // backtick fences cannot carry backticks in their info string
                if marker == b'`' && rest.contains('`') {
                    continue;
                }
                let diagram = is_diagram_lang(rest);
                if diagram {
                    diagrams += 1;
                }
                open = Some(OpenFence { marker, len: run.len(), diagram });
            }
        }
    }
    (diagrams, open)
}

/// True when the text contains at least one diagram fence opener.
pub fn has_diagram(text: &str) -> bool {
    scan_fences(text).0 > 0
}

/// True when a diagram fence has been opened but not yet closed.
///
/// Works on partial markdown: `"```mermaid\nA-->B"` is pending,
/// `"```mermaid\nA-->B\n```"` is not.
pub fn diagram_pending(text: &str) -> bool {
    scan_fences(text).1.is_some_and(|fence| fence.diagram)
}

fn is_diagram_lang(info: &str) -> bool {
    info.split_whitespace().next() == Some("mermaid")
}

// ---------------------------------------------------------------------------
// Escaping
// ---------------------------------------------------------------------------

/// Escape text for use in HTML content or a quoted attribute value.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML for a user bubble: the message is shown verbatim, never as markdown.
pub fn render_user_message(text: &str) -> String {
    format!(r#"<div class="user-message whitespace-pre-wrap">{}</div>"#, escape_html(text))
}

// ---------------------------------------------------------------------------
// Markdown → HTML
// ---------------------------------------------------------------------------

fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options
}

fn diagram_html(source: &str, pending: bool) -> String {
    let escaped = escape_html(source);
    let overlay_class = if pending { "render-overlay" } else { "render-overlay hidden" };
    format!(
        r#"<div class="mermaid-container"><button class="mermaid-zoom-btn" title="Zoom diagram">{ZOOM_ICON_SVG}</button><pre class="mermaid" data-mermaid-source="{escaped}">{escaped}</pre><div class="{overlay_class}">Rendering diagram…</div></div>"#
    )
}

fn image_html(url: &str, alt: &str, title: &str, status: ImageStatus) -> String {
    let url = escape_html(url);
    let alt = escape_html(alt);
    let title_attr = if title.is_empty() {
        String::new()
    } else {
        format!(r#" title="{}""#, escape_html(title))
    };
    let overlay = match status {
        ImageStatus::Pending => r#"<span class="render-overlay">Loading image…</span>"#,
        ImageStatus::Done => r#"<span class="render-overlay hidden">Loading image…</span>"#,
        ImageStatus::Failed => r#"<span class="render-overlay render-error">Failed to load image</span>"#,
    };
    format!(
        r#"<span class="image-container" data-image-url="{url}"><button class="image-zoom-btn" title="Zoom image">{ZOOM_ICON_SVG}</button><img src="{url}" alt="{alt}"{title_attr}>{overlay}</span>"#
    )
}

enum Capture {
    Idle,
    Diagram(String),
    Image { url: String, title: String, alt: String },
}

/// Render markdown to decorated (not yet sanitized) HTML.
///
/// `images` supplies the load status for generated images; an image that is
/// not in the list renders as loaded. When `pending` is set, the last diagram
/// in the document is the one whose fence is still open and keeps its overlay
/// visible.
pub fn markdown_to_html(text: &str, images: &[PendingImage], pending: bool) -> String {
    let events: Vec<Event<'_>> = Parser::new_ext(text, parser_options()).collect();
    let diagram_count = events
        .iter()
        .filter(|e| {
            matches!(e, Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))) if is_diagram_lang(lang))
        })
        .count();

    let status_of = |url: &str| {
        images
            .iter()
            .find(|img| img.url == url)
            .map(|img| img.status())
            .unwrap_or(ImageStatus::Done)
    };

    let mut out: Vec<Event<'_>> = Vec::with_capacity(events.len());
    let mut capture = Capture::Idle;
    let mut diagram_index = 0usize;

    for event in events {
        match capture {
            Capture::Diagram(ref mut source) => match event {
                Event::Text(t) => source.push_str(&t),
                Event::End(TagEnd::CodeBlock) => {
                    let is_last = diagram_index + 1 == diagram_count;
                    out.push(Event::Html(diagram_html(source, pending && is_last).into()));
                    diagram_index += 1;
                    capture = Capture::Idle;
                }
                _ => {}
            },
            Capture::Image { ref url, ref title, ref mut alt } => match event {
                Event::Text(t) | Event::Code(t) => alt.push_str(&t),
                Event::End(TagEnd::Image) => {
                    let markup = image_html(url, alt, title, status_of(url));
                    out.push(Event::Html(markup.into()));
                    capture = Capture::Idle;
                }
                _ => {}
            },
            Capture::Idle => match event {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(ref lang))) if is_diagram_lang(lang) => {
                    capture = Capture::Diagram(String::new());
                }
                Event::Start(Tag::Image { dest_url, title, .. }) => {
                    capture = Capture::Image {
                        url: dest_url.to_string(),
                        title: title.to_string(),
                        alt: String::new(),
                    };
                }
                // Streamed replies render single newlines as line breaks.
                Event::SoftBreak => out.push(Event::HardBreak),
                other => out.push(other),
            },
        }
    }

    let mut rendered = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut rendered, out.into_iter());
    rendered
}

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

const ALLOWED_TAGS: &[&str] = &[
    "p", "pre", "code", "span", "strong", "em", "del", "ul", "ol", "li", "blockquote", "h1", "h2",
    "h3", "h4", "h5", "h6", "a", "table", "thead", "tbody", "tr", "th", "td", "div", "button",
    "svg", "path", "img", "br", "hr",
];

fn sanitizer() -> ammonia::Builder<'static> {
    let mut builder = ammonia::Builder::empty();
    builder
        .add_tags(ALLOWED_TAGS)
        .add_clean_content_tags(&["script", "style"])
        .add_url_schemes(&["http", "https", "mailto"])
        .link_rel(Some("noopener noreferrer"))
        .add_tag_attributes("a", &["href", "title"])
        .add_tag_attributes("code", &["class"])
        .add_tag_attributes("pre", &["class", "data-mermaid-source"])
        .add_tag_attributes("div", &["class", "style"])
        .add_tag_attributes("span", &["class", "data-image-url"])
        .add_tag_attributes("p", &["class"])
        .add_tag_attributes("button", &["class", "title", "style"])
        .add_tag_attributes("svg", &["class", "fill", "stroke", "viewBox"])
        .add_tag_attributes("path", &["stroke-linecap", "stroke-linejoin", "stroke-width", "d"])
        .add_tag_attributes("img", &["src", "alt", "title"])
        .add_tag_attributes("th", &["style"])
        .add_tag_attributes("td", &["style"]);
    builder
}

/// Strip everything outside the allow-list of tags and attributes.
pub fn sanitize(html: &str) -> String {
    sanitizer().clean(html).to_string()
}

/// Markdown → sanitized HTML with default decoration state.
pub fn render_markdown(text: &str) -> String {
    sanitize(&markdown_to_html(text, &[], diagram_pending(text)))
}

// ---------------------------------------------------------------------------
// Message view-model
// ---------------------------------------------------------------------------

/// Transient per-bubble flags that gate overlay visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViewFlags {
    pub has_mermaid: bool,
    pub mermaid_pending: bool,
    pub rendering_image: bool,
    pub rendering_heavy: bool,
}

impl ViewFlags {
    pub fn cleared() -> Self {
        Self::default()
    }
}

/// Everything needed to paint one assistant bubble.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub html: String,
    pub flags: ViewFlags,
}

/// Render a streaming reply: buffer text plus image progress.
pub fn render_reply(text: &str, images: &[PendingImage], rendering_image: bool) -> MessageView {
    let has_mermaid = has_diagram(text);
    let mermaid_pending = has_mermaid && diagram_pending(text);
    let image_loading = images.iter().any(|img| img.status() == ImageStatus::Pending);

    let mut html = if text.trim().is_empty() && !rendering_image {
        THINKING_HTML.to_string()
    } else {
        sanitize(&markdown_to_html(text, images, mermaid_pending))
    };
    if rendering_image {
        html.push_str(IMAGE_PROGRESS_HTML);
    }

    MessageView {
        html,
        flags: ViewFlags {
            has_mermaid,
            mermaid_pending,
            rendering_image: rendering_image || image_loading,
            rendering_heavy: mermaid_pending || rendering_image || image_loading,
        },
    }
}
