use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Border and title styles for one panel tone.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PanelStyle {
    pub border_style: Option<String>,
    pub title_style: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ShellSettings {
    /// Shell used to run commands; falls back to `$SHELL`, then `/bin/sh`.
    pub default_shell: Option<String>,
    /// Show the exit-code summary panel after each command.
    pub stream_summary_panel: Option<bool>,
    /// Print captured output inside a panel instead of as bare text.
    pub stream_output_panel: Option<bool>,
    pub max_visible_lines: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub exit_wait_ms: Option<u64>,
    pub max_exit_wait_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct UiSettings {
    pub refresh_per_second: Option<u32>,
    pub ai_max_visible_lines: Option<usize>,
    /// Keyed by tone: `default`, `info`, `success`, `warning`, `error`.
    #[serde(default)]
    pub panel_styles: BTreeMap<String, PanelStyle>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AiSettings {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub shell: ShellSettings,
    #[serde(default)]
    pub ui: UiSettings,
    #[serde(default)]
    pub ai: AiSettings,
}

/// The user's home directory, as `directories` resolves it.
pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = home_dir() {
            match path.strip_prefix(&home) {
                Ok(relative) if relative.as_os_str().is_empty() => return "~".to_string(),
                Ok(relative) => return format!("~/{}", relative.display()),
                Err(_) => {}
            }
        }
    }

    path.display().to_string()
}
