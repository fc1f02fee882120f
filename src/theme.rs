//! Theme preference: light, dark, or follow the system.
//!
//! The choice persists as a single `parlanchina-theme` key in a small TOML
//! file. A system preference change only matters while the saved choice is
//! `system`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Key under which the preference is stored.
pub const STORAGE_KEY: &str = "parlanchina-theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemePreference {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemePreference::Light => "light",
            ThemePreference::Dark => "dark",
            ThemePreference::System => "system",
        }
    }

    pub fn resolve(self, system_dark: bool) -> EffectiveTheme {
        match self {
            ThemePreference::Light => EffectiveTheme::Light,
            ThemePreference::Dark => EffectiveTheme::Dark,
            ThemePreference::System if system_dark => EffectiveTheme::Dark,
            ThemePreference::System => EffectiveTheme::Light,
        }
    }
}

impl fmt::Display for ThemePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemePreference {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(ThemePreference::Light),
            "dark" => Ok(ThemePreference::Dark),
            "system" => Ok(ThemePreference::System),
            other => Err(ClientError::validation(format!("unknown theme '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveTheme {
    Light,
    Dark,
}

impl EffectiveTheme {
    pub fn is_dark(self) -> bool {
        self == EffectiveTheme::Dark
    }

    /// Theme name handed to the diagram renderer.
    pub fn diagram_theme(self) -> &'static str {
        match self {
            EffectiveTheme::Dark => "dark",
            EffectiveTheme::Light => "default",
        }
    }
}

/// Guess the terminal's dark/light background from `COLORFGBG`
/// (`"15;0"` means light text on a dark background).
pub fn system_prefers_dark() -> bool {
    colorfgbg_is_dark(std::env::var("COLORFGBG").ok().as_deref())
}

fn colorfgbg_is_dark(value: Option<&str>) -> bool {
    value
        .and_then(|v| v.rsplit(';').next())
        .and_then(|bg| bg.trim().parse::<u8>().ok())
        .map(|bg| bg < 7 || bg == 8)
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Reads and writes the saved preference.
#[derive(Debug, Clone)]
pub struct ThemeStore {
    path: PathBuf,
}

impl ThemeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `parlanchina/theme.toml` under the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| Self::path_under(&dir))
    }

    fn path_under(config_dir: &Path) -> PathBuf {
        config_dir.join("parlanchina").join("theme.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved preference; a missing or unreadable value means `system`.
    pub fn load(&self) -> ThemePreference {
        let Ok(text) = std::fs::read_to_string(&self.path) else {
            return ThemePreference::System;
        };
        let value = text
            .parse::<toml::Table>()
            .ok()
            .and_then(|t| t.get(STORAGE_KEY).and_then(|v| v.as_str().map(str::to_string)));
        match value.as_deref().map(str::parse::<ThemePreference>) {
            Some(Ok(pref)) => pref,
            Some(Err(e)) => {
                warn!(path = %self.path.display(), error = %e, "ignoring saved theme");
                ThemePreference::System
            }
            None => ThemePreference::System,
        }
    }

    pub fn save(&self, pref: ThemePreference) -> Result<()> {
        let mut table = toml::Table::new();
        table.insert(STORAGE_KEY.to_string(), toml::Value::String(pref.to_string()));
        let text = toml::to_string(&table).map_err(|e| ClientError::Config(e.to_string()))?;
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, text)?;
        debug!(path = %self.path.display(), theme = %pref, "theme saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Tracks the saved choice, the system preference and what is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeController {
    saved: ThemePreference,
    system_dark: bool,
    applied: EffectiveTheme,
}

impl ThemeController {
    pub fn new(saved: ThemePreference, system_dark: bool) -> Self {
        Self { saved, system_dark, applied: saved.resolve(system_dark) }
    }

    /// The user picked a theme; returns what to apply.
    pub fn select(&mut self, pref: ThemePreference) -> EffectiveTheme {
        self.saved = pref;
        self.applied = pref.resolve(self.system_dark);
        self.applied
    }

    /// The system preference flipped. Returns the theme to re-apply, or
    /// `None` when an explicit choice is in force.
    pub fn system_changed(&mut self, dark: bool) -> Option<EffectiveTheme> {
        self.system_dark = dark;
        if self.saved != ThemePreference::System {
            return None;
        }
        self.applied = self.saved.resolve(dark);
        Some(self.applied)
    }

    pub fn saved(&self) -> ThemePreference {
        self.saved
    }

    pub fn applied(&self) -> EffectiveTheme {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ThemePreference::Light, false, EffectiveTheme::Light)]
    #[case(ThemePreference::Light, true, EffectiveTheme::Light)]
    #[case(ThemePreference::Dark, false, EffectiveTheme::Dark)]
    #[case(ThemePreference::System, true, EffectiveTheme::Dark)]
    #[case(ThemePreference::System, false, EffectiveTheme::Light)]
    fn test_resolve_table(
        #[case] pref: ThemePreference,
        #[case] system_dark: bool,
        #[case] expected: EffectiveTheme,
    ) {
        assert_eq!(pref.resolve(system_dark), expected);
    }

    #[test]
    fn test_diagram_theme_names() {
        assert_eq!(EffectiveTheme::Dark.diagram_theme(), "dark");
        assert_eq!(EffectiveTheme::Light.diagram_theme(), "default");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("DARK".parse::<ThemePreference>().unwrap(), ThemePreference::Dark);
        assert!("sepia".parse::<ThemePreference>().is_err());
    }

    #[rstest]
    #[case(Some("15;0"), true)]
    #[case(Some("0;15"), false)]
    #[case(Some("15;default;0"), true)]
    #[case(Some("garbage"), false)]
    #[case(None, false)]
    fn test_colorfgbg(#[case] value: Option<&str>, #[case] dark: bool) {
        assert_eq!(colorfgbg_is_dark(value), dark);
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThemeStore::new(dir.path().join("nested").join("theme.toml"));
        assert_eq!(store.load(), ThemePreference::System);
        store.save(ThemePreference::Dark).unwrap();
        assert_eq!(store.load(), ThemePreference::Dark);
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("parlanchina-theme = \"dark\""), "{text}");
    }

    #[test]
    fn test_default_path_under_platform_config_dir() {
        let path = ThemeStore::path_under(Path::new("/cfg"));
        assert_eq!(path, PathBuf::from("/cfg/parlanchina/theme.toml"));
        if let (Some(default), Some(dir)) = (ThemeStore::default_path(), dirs::config_dir()) {
            assert!(default.starts_with(dir));
            assert!(default.ends_with("parlanchina/theme.toml"));
        }
    }

    #[test]
    fn test_store_ignores_bad_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("theme.toml");
        std::fs::write(&path, "parlanchina-theme = \"sepia\"\n").unwrap();
        assert_eq!(ThemeStore::new(path).load(), ThemePreference::System);
    }

    #[test]
    fn test_system_change_only_applies_under_system() {
        let mut ctl = ThemeController::new(ThemePreference::System, false);
        assert_eq!(ctl.system_changed(true), Some(EffectiveTheme::Dark));
        ctl.select(ThemePreference::Light);
        assert_eq!(ctl.system_changed(false), None);
        assert_eq!(ctl.system_changed(true), None);
        assert_eq!(ctl.applied(), EffectiveTheme::Light);
        assert_eq!(ctl.select(ThemePreference::System), EffectiveTheme::Dark);
    }
}
