//! Zoom viewer and settings/about overlays as event-driven state machines.
//!
//! Each machine takes one input event and returns the side effects the host
//! should perform, so the same logic drives a browser shell or a terminal.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};

use crate::stream::DEFAULT_ALT_TEXT;

pub const ZOOM_MIN: u32 = 25;
pub const ZOOM_MAX: u32 = 300;
pub const ZOOM_DEFAULT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Other,
}

/// Side effects requested by a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Page scrolling is disabled while an overlay is open.
    LockScroll,
    RestoreScroll,
    /// Re-render this diagram source inside the viewer.
    RenderDiagram(String),
}

// ---------------------------------------------------------------------------
// Zoom viewer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoomContent {
    Diagram { source: String },
    Image { url: String, alt_text: String },
}

impl ZoomContent {
    /// Every zoomable element of a reply, in document order.
    pub fn collect(markdown: &str) -> Vec<ZoomContent> {
        let mut found = Vec::new();
        let mut diagram: Option<String> = None;
        let mut image: Option<(String, String)> = None;

        for event in Parser::new(markdown) {
            match event {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang)))
                    if lang.trim().eq_ignore_ascii_case("mermaid") =>
                {
                    diagram = Some(String::new());
                }
                Event::Text(text) if diagram.is_some() => {
                    if let Some(source) = diagram.as_mut() {
                        source.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some(source) = diagram.take() {
                        found.push(ZoomContent::Diagram { source: source.trim_end().to_string() });
                    }
                }
                Event::Start(Tag::Image { dest_url, .. }) => {
                    image = Some((dest_url.to_string(), String::new()));
                }
                Event::Text(text) if image.is_some() => {
                    if let Some((_, alt)) = image.as_mut() {
                        alt.push_str(&text);
                    }
                }
                Event::End(TagEnd::Image) => {
                    if let Some((url, alt)) = image.take() {
                        let alt_text = if alt.is_empty() { DEFAULT_ALT_TEXT.to_string() } else { alt };
                        found.push(ZoomContent::Image { url, alt_text });
                    }
                }
                _ => {}
            }
        }
        found
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoomEvent {
    Open(ZoomContent),
    Slider(u32),
    CloseButton,
    /// A click inside the modal; `on_backdrop` is true when the target is
    /// the backdrop itself rather than the content.
    Click { on_backdrop: bool },
    Key(Key),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ZoomViewer {
    #[default]
    Closed,
    Open { content: ZoomContent, zoom_percent: u32 },
}

impl ZoomViewer {
    pub fn handle(&mut self, event: ZoomEvent) -> Vec<Effect> {
        match event {
            ZoomEvent::Open(content) => {
                let mut effects = vec![Effect::LockScroll];
                if let ZoomContent::Diagram { source } = &content {
                    effects.push(Effect::RenderDiagram(source.clone()));
                }
                *self = ZoomViewer::Open { content, zoom_percent: ZOOM_DEFAULT };
                effects
            }
            ZoomEvent::Slider(value) => {
                if let ZoomViewer::Open { zoom_percent, .. } = self {
                    *zoom_percent = value.clamp(ZOOM_MIN, ZOOM_MAX);
                }
                Vec::new()
            }
            ZoomEvent::CloseButton
            | ZoomEvent::Click { on_backdrop: true }
            | ZoomEvent::Key(Key::Escape) => self.close(),
            ZoomEvent::Click { on_backdrop: false } | ZoomEvent::Key(Key::Other) => Vec::new(),
        }
    }

    fn close(&mut self) -> Vec<Effect> {
        if !self.is_open() {
            return Vec::new();
        }
        *self = ZoomViewer::Closed;
        vec![Effect::RestoreScroll]
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ZoomViewer::Open { .. })
    }

    pub fn scroll_locked(&self) -> bool {
        self.is_open()
    }

    pub fn content(&self) -> Option<&ZoomContent> {
        match self {
            ZoomViewer::Open { content, .. } => Some(content),
            ZoomViewer::Closed => None,
        }
    }

    pub fn zoom_percent(&self) -> u32 {
        match self {
            ZoomViewer::Open { zoom_percent, .. } => *zoom_percent,
            ZoomViewer::Closed => ZOOM_DEFAULT,
        }
    }

    /// Scale factor applied to the content.
    pub fn scale(&self) -> f64 {
        f64::from(self.zoom_percent()) / 100.0
    }

    pub fn zoom_label(&self) -> String {
        format!("{}%", self.zoom_percent())
    }
}

// ---------------------------------------------------------------------------
// Settings menu and About modal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEvent {
    ToggleButton,
    About,
    /// A click anywhere on the page.
    DocumentClick { inside_menu: bool },
    Key(Key),
    AboutBackdrop,
    AboutClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsMenu {
    menu_open: bool,
    about_open: bool,
}

impl SettingsMenu {
    pub fn handle(&mut self, event: MenuEvent) -> Vec<Effect> {
        match event {
            MenuEvent::ToggleButton => {
                self.menu_open = !self.menu_open;
                Vec::new()
            }
            MenuEvent::About => {
                self.menu_open = false;
                self.open_about()
            }
            MenuEvent::DocumentClick { inside_menu: false } => {
                self.menu_open = false;
                Vec::new()
            }
            MenuEvent::DocumentClick { inside_menu: true } => Vec::new(),
            MenuEvent::Key(Key::Escape) => {
                if self.about_open {
                    self.close_about()
                } else {
                    self.menu_open = false;
                    Vec::new()
                }
            }
            MenuEvent::Key(Key::Other) => Vec::new(),
            MenuEvent::AboutBackdrop | MenuEvent::AboutClose => self.close_about(),
        }
    }

    fn open_about(&mut self) -> Vec<Effect> {
        if self.about_open {
            return Vec::new();
        }
        self.about_open = true;
        vec![Effect::LockScroll]
    }

    fn close_about(&mut self) -> Vec<Effect> {
        if !self.about_open {
            return Vec::new();
        }
        self.about_open = false;
        vec![Effect::RestoreScroll]
    }

    pub fn menu_open(&self) -> bool {
        self.menu_open
    }

    pub fn about_open(&self) -> bool {
        self.about_open
    }

    /// Value of the toggle button's `aria-expanded` attribute.
    pub fn aria_expanded(&self) -> &'static str {
        if self.menu_open {
            "true"
        } else {
            "false"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagram() -> ZoomContent {
        ZoomContent::Diagram { source: "graph TD; A-->B".into() }
    }

    #[test]
    fn test_open_resets_zoom_and_renders_diagram() {
        let mut viewer = ZoomViewer::default();
        viewer.handle(ZoomEvent::Open(diagram()));
        viewer.handle(ZoomEvent::Slider(180));
        let effects = viewer.handle(ZoomEvent::Open(diagram()));
        assert_eq!(viewer.zoom_percent(), 100);
        assert_eq!(
            effects,
            vec![Effect::LockScroll, Effect::RenderDiagram("graph TD; A-->B".into())]
        );
        assert!(viewer.scroll_locked());
    }

    #[test]
    fn test_image_open_has_no_render_effect() {
        let mut viewer = ZoomViewer::default();
        let effects = viewer.handle(ZoomEvent::Open(ZoomContent::Image {
            url: "/img.png".into(),
            alt_text: "cat".into(),
        }));
        assert_eq!(effects, vec![Effect::LockScroll]);
    }

    #[test]
    fn test_slider_sets_scale_and_clamps() {
        let mut viewer = ZoomViewer::default();
        viewer.handle(ZoomEvent::Open(diagram()));
        viewer.handle(ZoomEvent::Slider(150));
        assert_eq!(viewer.scale(), 1.5);
        assert_eq!(viewer.zoom_label(), "150%");
        viewer.handle(ZoomEvent::Slider(5));
        assert_eq!(viewer.zoom_percent(), ZOOM_MIN);
        viewer.handle(ZoomEvent::Slider(900));
        assert_eq!(viewer.zoom_percent(), ZOOM_MAX);
    }

    #[test]
    fn test_slider_ignored_while_closed() {
        let mut viewer = ZoomViewer::default();
        assert!(viewer.handle(ZoomEvent::Slider(150)).is_empty());
        assert_eq!(viewer, ZoomViewer::Closed);
    }

    #[test]
    fn test_close_paths_restore_scroll() {
        for event in [
            ZoomEvent::CloseButton,
            ZoomEvent::Click { on_backdrop: true },
            ZoomEvent::Key(Key::Escape),
        ] {
            let mut viewer = ZoomViewer::default();
            viewer.handle(ZoomEvent::Open(diagram()));
            assert_eq!(viewer.handle(event), vec![Effect::RestoreScroll]);
            assert!(viewer.content().is_none());
            assert!(!viewer.scroll_locked());
        }
    }

    #[test]
    fn test_click_on_content_keeps_viewer_open() {
        let mut viewer = ZoomViewer::default();
        viewer.handle(ZoomEvent::Open(diagram()));
        assert!(viewer.handle(ZoomEvent::Click { on_backdrop: false }).is_empty());
        assert!(viewer.is_open());
    }

    #[test]
    fn test_collect_finds_diagrams_and_images_in_order() {
        let md = "![chart](/a.png)\n\n```mermaid\ngraph TD; A-->B\n```\n\n![](/b.png)\n";
        assert_eq!(
            ZoomContent::collect(md),
            vec![
                ZoomContent::Image { url: "/a.png".into(), alt_text: "chart".into() },
                ZoomContent::Diagram { source: "graph TD; A-->B".into() },
                ZoomContent::Image { url: "/b.png".into(), alt_text: DEFAULT_ALT_TEXT.into() },
            ]
        );
    }

    #[test]
    fn test_collect_skips_other_code_blocks() {
        assert!(ZoomContent::collect("```rust\nfn main() {}\n```").is_empty());
    }

    #[test]
    fn test_menu_toggle_mirrors_aria() {
        let mut menu = SettingsMenu::default();
        assert_eq!(menu.aria_expanded(), "false");
        menu.handle(MenuEvent::ToggleButton);
        assert_eq!(menu.aria_expanded(), "true");
        menu.handle(MenuEvent::DocumentClick { inside_menu: true });
        assert!(menu.menu_open());
        menu.handle(MenuEvent::DocumentClick { inside_menu: false });
        assert!(!menu.menu_open());
    }

    #[test]
    fn test_about_closes_menu_and_locks_scroll() {
        let mut menu = SettingsMenu::default();
        menu.handle(MenuEvent::ToggleButton);
        assert_eq!(menu.handle(MenuEvent::About), vec![Effect::LockScroll]);
        assert!(!menu.menu_open());
        assert!(menu.about_open());
    }

    #[test]
    fn test_escape_closes_modal_before_menu() {
        let mut menu = SettingsMenu::default();
        menu.handle(MenuEvent::About);
        menu.handle(MenuEvent::ToggleButton);
        assert_eq!(menu.handle(MenuEvent::Key(Key::Escape)), vec![Effect::RestoreScroll]);
        assert!(menu.menu_open());
        menu.handle(MenuEvent::Key(Key::Escape));
        assert!(!menu.menu_open());
    }

    #[test]
    fn test_backdrop_and_close_button_close_about() {
        for event in [MenuEvent::AboutBackdrop, MenuEvent::AboutClose] {
            let mut menu = SettingsMenu::default();
            menu.handle(MenuEvent::About);
            assert_eq!(menu.handle(event), vec![Effect::RestoreScroll]);
            assert!(!menu.about_open());
        }
    }
}
