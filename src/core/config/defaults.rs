use std::time::Duration;

use crate::core::config::data::{Config, PanelStyle};
use crate::core::generation::GenerationOptions;
use crate::core::multiplexer::MultiplexerOptions;
use crate::ui::frame::FrameTone;

pub const SUMMARY_PANEL_ENV: &str = "SIMPL_SHELL_STREAM_PANEL";
pub const OUTPUT_PANEL_ENV: &str = "SIMPL_SHELL_STREAM_OUTPUT_PANEL";
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// Truthy values accepted by the boolean environment toggles.
pub fn env_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_override(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|value| env_flag(&value))
}

/// Built-in colours per tone, used when the config names none.
pub fn default_panel_style(tone: FrameTone) -> PanelStyle {
    let color = match tone {
        FrameTone::Default => "#888888",
        FrameTone::Info => "#8caaee",
        FrameTone::Success => "#a6d189",
        FrameTone::Warning => "#e5c890",
        FrameTone::Error => "#e78284",
    };
    PanelStyle {
        border_style: Some(color.to_string()),
        title_style: Some(format!("bold {color}")),
    }
}

impl Config {
    pub fn shell_program(&self) -> String {
        self.shell
            .default_shell
            .clone()
            .filter(|shell| !shell.trim().is_empty())
            .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| FALLBACK_SHELL.to_string())
    }

    /// Environment wins over the config file.
    pub fn stream_summary_enabled(&self) -> bool {
        env_override(SUMMARY_PANEL_ENV)
            .or(self.shell.stream_summary_panel)
            .unwrap_or(true)
    }

    pub fn stream_output_panel_enabled(&self) -> bool {
        env_override(OUTPUT_PANEL_ENV)
            .or(self.shell.stream_output_panel)
            .unwrap_or(true)
    }

    pub fn refresh_per_second(&self) -> u32 {
        self.ui.refresh_per_second.filter(|fps| *fps > 0).unwrap_or(12)
    }

    pub fn multiplexer_options(&self) -> MultiplexerOptions {
        let defaults = MultiplexerOptions::default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };
        let exit_wait = millis(self.shell.exit_wait_ms, defaults.exit_wait);

        MultiplexerOptions {
            max_visible_lines: self
                .shell
                .max_visible_lines
                .unwrap_or(defaults.max_visible_lines),
            poll_interval: millis(self.shell.poll_interval_ms, defaults.poll_interval),
            exit_wait,
            max_exit_wait: millis(self.shell.max_exit_wait_ms, defaults.max_exit_wait)
                .max(exit_wait),
            refresh_per_second: self.refresh_per_second(),
            summary_panel: self.stream_summary_enabled(),
            output_panel: self.stream_output_panel_enabled(),
        }
    }

    pub fn generation_options(&self) -> GenerationOptions {
        let defaults = GenerationOptions::default();
        GenerationOptions {
            max_visible_lines: self
                .ui
                .ai_max_visible_lines
                .unwrap_or(defaults.max_visible_lines),
            refresh_per_second: self.refresh_per_second(),
        }
    }

    /// Configured style for `tone`, with unset fields taken from the defaults.
    pub fn panel_style(&self, tone: FrameTone) -> PanelStyle {
        let fallback = default_panel_style(tone);
        match self.ui.panel_styles.get(tone.key()) {
            Some(style) => PanelStyle {
                border_style: style.border_style.clone().or(fallback.border_style),
                title_style: style.title_style.clone().or(fallback.title_style),
            },
            None => fallback,
        }
    }
}
