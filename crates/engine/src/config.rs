// Editor configuration.
//
// Global config: `~/.jotter/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default autosave debounce window.
const DEFAULT_DEBOUNCE_MS: u64 = 1_500;
/// Minimum allowed debounce window.
const MIN_DEBOUNCE_MS: u64 = 250;
/// Maximum allowed debounce window.
const MAX_DEBOUNCE_MS: u64 = 5_000;

/// Default undo history depth.
const DEFAULT_UNDO_DEPTH: usize = 20;
const MAX_UNDO_DEPTH: usize = 200;

/// Root directory for Jotter global state: `~/.jotter/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".jotter"))
}

/// Path to the global config file: `~/.jotter/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Editor configuration at `~/.jotter/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct EditorConfig {
    pub autosave: AutosaveConfig,
    pub undo: UndoConfig,
    /// AI settings.
    pub ai: AiConfig,
}

impl EditorConfig {
    /// Load from `~/.jotter/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `~/.jotter/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Autosave debounce settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Debounce window in milliseconds, clamped to [250, 5000].
    pub debounce_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { debounce_ms: DEFAULT_DEBOUNCE_MS }
    }
}

impl AutosaveConfig {
    /// The effective debounce window, clamped to the allowed range.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS))
    }
}

/// Undo history settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UndoConfig {
    /// Snapshot stack capacity, clamped to [1, 200].
    pub depth: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self { depth: DEFAULT_UNDO_DEPTH }
    }
}

impl UndoConfig {
    pub fn effective_depth(&self) -> usize {
        self.depth.clamp(1, MAX_UNDO_DEPTH)
    }
}

/// AI service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
#[derive(Default)]
pub struct AiConfig {
    /// API keys are stored in the OS keychain, not in config files.
    /// Model to use (e.g. `claude-haiku-4-5-20251001`).
    pub model: Option<String>,
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
