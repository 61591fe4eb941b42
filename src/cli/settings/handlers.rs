//! Data-driven setting handlers.

use crate::cli::settings::error::SettingError;
use crate::cli::settings::helpers::{
    format_bool, parse_bool, parse_number, success_set, truncate_with_ellipsis,
};
use crate::cli::settings::SettingHandler;
use crate::core::config::data::{Config, PanelStyle};
use crate::core::config::defaults::default_panel_style;
use crate::core::render_buffer::{DEFAULT_AI_VISIBLE_LINES, DEFAULT_SHELL_VISIBLE_LINES};
use crate::ui::frame::FrameTone;
use crate::ui::theme::parse_style;

/// Handler for on/off settings.
pub struct BooleanHandler {
    pub key: &'static str,
    pub example: &'static str,
    pub default_display: &'static str,
    pub get: fn(&Config) -> Option<bool>,
    pub set_field: fn(&mut Config, Option<bool>),
}

impl SettingHandler for BooleanHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        if args.is_empty() {
            return Err(SettingError::MissingArgs {
                hint: "Specify on or off:",
                example: self.example,
            });
        }

        let input = args.join(" ");
        let value = parse_bool(&input).ok_or(SettingError::InvalidBoolean(input))?;
        (self.set_field)(config, Some(value));
        Ok(success_set(self.key, format_bool(value)))
    }

    fn unset(&self, config: &mut Config) -> String {
        (self.set_field)(config, None);
        format!(
            "✅ Unset {} (will use default: {})",
            self.key, self.default_display
        )
    }

    fn format(&self, config: &Config) -> String {
        match (self.get)(config) {
            Some(value) => format!("  {}: {}", self.key, format_bool(value)),
            None => format!("  {}: (unset, default: {})", self.key, self.default_display),
        }
    }
}

/// Handler for whole-number settings such as line counts and timeouts.
pub struct NumberHandler {
    pub key: &'static str,
    pub example: &'static str,
    pub min: u64,
    pub default_value: u64,
    pub get: fn(&Config) -> Option<u64>,
    pub set_field: fn(&mut Config, Option<u64>),
}

impl SettingHandler for NumberHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let [input] = args else {
            return Err(SettingError::MissingArgs {
                hint: "Specify a single whole number:",
                example: self.example,
            });
        };
        let value = parse_number(self.key, input, self.min)?;
        (self.set_field)(config, Some(value));
        Ok(success_set(self.key, &value.to_string()))
    }

    fn unset(&self, config: &mut Config) -> String {
        (self.set_field)(config, None);
        format!(
            "✅ Unset {} (will use default: {})",
            self.key, self.default_value
        )
    }

    fn format(&self, config: &Config) -> String {
        match (self.get)(config) {
            Some(value) => format!("  {}: {value}", self.key),
            None => format!("  {}: (unset, default: {})", self.key, self.default_value),
        }
    }
}

/// Handler for free-text settings; multiple words are joined with spaces.
pub struct StringHandler {
    pub key: &'static str,
    pub example: &'static str,
    pub default_display: &'static str,
    pub get: fn(&Config) -> Option<&String>,
    pub set_field: fn(&mut Config, Option<String>),
}

impl SettingHandler for StringHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let value = args.join(" ");
        if value.trim().is_empty() {
            return Err(SettingError::MissingArgs {
                hint: "Provide a value:",
                example: self.example,
            });
        }
        let display = truncate_with_ellipsis(&value, 50);
        (self.set_field)(config, Some(value));
        Ok(success_set(self.key, &display))
    }

    fn unset(&self, config: &mut Config) -> String {
        (self.set_field)(config, None);
        format!(
            "✅ Unset {} (will use default: {})",
            self.key, self.default_display
        )
    }

    fn format(&self, config: &Config) -> String {
        match (self.get)(config) {
            Some(value) => format!("  {}: {}", self.key, truncate_with_ellipsis(value, 50)),
            None => format!("  {}: (unset, default: {})", self.key, self.default_display),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelPart {
    Border,
    Title,
}

/// Handler for `ui.panel_styles.<tone>.border` and `.title`.
pub struct PanelStyleHandler {
    pub key: &'static str,
    pub tone: FrameTone,
    pub part: PanelPart,
}

impl PanelStyleHandler {
    fn slot<'a>(&self, style: &'a mut PanelStyle) -> &'a mut Option<String> {
        match self.part {
            PanelPart::Border => &mut style.border_style,
            PanelPart::Title => &mut style.title_style,
        }
    }

    fn pick(&self, style: PanelStyle) -> Option<String> {
        match self.part {
            PanelPart::Border => style.border_style,
            PanelPart::Title => style.title_style,
        }
    }
}

impl SettingHandler for PanelStyleHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let value = args.join(" ");
        if value.trim().is_empty() {
            return Err(SettingError::MissingArgs {
                hint: "Provide a colour and optional modifiers:",
                example: "simpl set ui.panel_styles.info.border \"bold #8caaee\"",
            });
        }
        if parse_style(Some(&value)) == ratatui::style::Style::default() {
            return Err(SettingError::MissingArgs {
                hint: "No colour recognised; use hex, rgb() or a colour name, plus modifiers:",
                example: "simpl set ui.panel_styles.error.title \"bold red\"",
            });
        }
        let style = config
            .ui
            .panel_styles
            .entry(self.tone.key().to_string())
            .or_default();
        *self.slot(style) = Some(value.clone());
        Ok(success_set(self.key, &value))
    }

    fn unset(&self, config: &mut Config) -> String {
        if let Some(style) = config.ui.panel_styles.get_mut(self.tone.key()) {
            *self.slot(style) = None;
            if style.border_style.is_none() && style.title_style.is_none() {
                config.ui.panel_styles.remove(self.tone.key());
            }
        }
        let default = self
            .pick(default_panel_style(self.tone))
            .unwrap_or_default();
        format!("✅ Unset {} (will use default: {default})", self.key)
    }

    fn format(&self, config: &Config) -> String {
        let configured = config
            .ui
            .panel_styles
            .get(self.tone.key())
            .cloned()
            .and_then(|style| self.pick(style));
        match configured {
            Some(value) => format!("  {}: {value}", self.key),
            None => format!(
                "  {}: (unset, default: {})",
                self.key,
                self.pick(default_panel_style(self.tone)).unwrap_or_default()
            ),
        }
    }
}

fn to_u64(value: Option<usize>) -> Option<u64> {
    value.map(|v| v as u64)
}

fn to_usize(value: Option<u64>) -> Option<usize> {
    value.map(|v| usize::try_from(v).unwrap_or(usize::MAX))
}

pub fn boolean_handlers() -> Vec<BooleanHandler> {
    vec![
        BooleanHandler {
            key: "shell.stream_summary_panel",
            example: "simpl set shell.stream_summary_panel off",
            default_display: "on",
            get: |c| c.shell.stream_summary_panel,
            set_field: |c, v| c.shell.stream_summary_panel = v,
        },
        BooleanHandler {
            key: "shell.stream_output_panel",
            example: "simpl set shell.stream_output_panel off",
            default_display: "on",
            get: |c| c.shell.stream_output_panel,
            set_field: |c, v| c.shell.stream_output_panel = v,
        },
    ]
}

pub fn number_handlers() -> Vec<NumberHandler> {
    vec![
        NumberHandler {
            key: "shell.max_visible_lines",
            example: "simpl set shell.max_visible_lines 20",
            min: 1,
            default_value: DEFAULT_SHELL_VISIBLE_LINES as u64,
            get: |c| to_u64(c.shell.max_visible_lines),
            set_field: |c, v| c.shell.max_visible_lines = to_usize(v),
        },
        NumberHandler {
            key: "shell.poll_interval_ms",
            example: "simpl set shell.poll_interval_ms 50",
            min: 1,
            default_value: 100,
            get: |c| c.shell.poll_interval_ms,
            set_field: |c, v| c.shell.poll_interval_ms = v,
        },
        NumberHandler {
            key: "shell.exit_wait_ms",
            example: "simpl set shell.exit_wait_ms 200",
            min: 0,
            default_value: 100,
            get: |c| c.shell.exit_wait_ms,
            set_field: |c, v| c.shell.exit_wait_ms = v,
        },
        NumberHandler {
            key: "shell.max_exit_wait_ms",
            example: "simpl set shell.max_exit_wait_ms 2000",
            min: 0,
            default_value: 1000,
            get: |c| c.shell.max_exit_wait_ms,
            set_field: |c, v| c.shell.max_exit_wait_ms = v,
        },
        NumberHandler {
            key: "ui.refresh_per_second",
            example: "simpl set ui.refresh_per_second 30",
            min: 1,
            default_value: 12,
            get: |c| c.ui.refresh_per_second.map(u64::from),
            set_field: |c, v| {
                c.ui.refresh_per_second = v.map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            },
        },
        NumberHandler {
            key: "ui.ai_max_visible_lines",
            example: "simpl set ui.ai_max_visible_lines 12",
            min: 1,
            default_value: DEFAULT_AI_VISIBLE_LINES as u64,
            get: |c| to_u64(c.ui.ai_max_visible_lines),
            set_field: |c, v| c.ui.ai_max_visible_lines = to_usize(v),
        },
    ]
}

pub fn string_handlers() -> Vec<StringHandler> {
    vec![
        StringHandler {
            key: "shell.default_shell",
            example: "simpl set shell.default_shell /bin/zsh",
            default_display: "$SHELL, then /bin/sh",
            get: |c| c.shell.default_shell.as_ref(),
            set_field: |c, v| c.shell.default_shell = v,
        },
        StringHandler {
            key: "ai.model",
            example: "simpl set ai.model gpt-4o-mini",
            default_display: crate::core::providers::DEFAULT_MODEL,
            get: |c| c.ai.model.as_ref(),
            set_field: |c, v| c.ai.model = v,
        },
        StringHandler {
            key: "ai.base_url",
            example: "simpl set ai.base_url http://localhost:11434/v1",
            default_display: crate::core::providers::DEFAULT_OPENAI_BASE_URL,
            get: |c| c.ai.base_url.as_ref(),
            set_field: |c, v| c.ai.base_url = v,
        },
        StringHandler {
            key: "ai.system_prompt",
            example: "simpl set ai.system_prompt \"Answer in one sentence.\"",
            default_display: "built-in prompt",
            get: |c| c.ai.system_prompt.as_ref(),
            set_field: |c, v| c.ai.system_prompt = v,
        },
    ]
}

pub fn panel_style_handlers() -> Vec<PanelStyleHandler> {
    const KEYS: [(FrameTone, &str, &str); 5] = [
        (
            FrameTone::Default,
            "ui.panel_styles.default.border",
            "ui.panel_styles.default.title",
        ),
        (
            FrameTone::Info,
            "ui.panel_styles.info.border",
            "ui.panel_styles.info.title",
        ),
        (
            FrameTone::Success,
            "ui.panel_styles.success.border",
            "ui.panel_styles.success.title",
        ),
        (
            FrameTone::Warning,
            "ui.panel_styles.warning.border",
            "ui.panel_styles.warning.title",
        ),
        (
            FrameTone::Error,
            "ui.panel_styles.error.border",
            "ui.panel_styles.error.title",
        ),
    ];

    KEYS.iter()
        .flat_map(|&(tone, border, title)| {
            [
                PanelStyleHandler {
                    key: border,
                    tone,
                    part: PanelPart::Border,
                },
                PanelStyleHandler {
                    key: title,
                    tone,
                    part: PanelPart::Title,
                },
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn number(key: &str) -> NumberHandler {
        number_handlers()
            .into_iter()
            .find(|h| h.key == key)
            .expect("handler registered")
    }

    #[test]
    fn boolean_set_and_unset() {
        let handler = &boolean_handlers()[0];
        let mut config = Config::default();

        let message = handler.set(&args(&["off"]), &mut config).unwrap();
        assert_eq!(message, "✅ Set shell.stream_summary_panel to: off");
        assert_eq!(config.shell.stream_summary_panel, Some(false));
        assert_eq!(handler.format(&config), "  shell.stream_summary_panel: off");

        handler.unset(&mut config);
        assert_eq!(config.shell.stream_summary_panel, None);
        assert!(matches!(
            handler.set(&args(&["sometimes"]), &mut config),
            Err(SettingError::InvalidBoolean(_))
        ));
    }

    #[test]
    fn number_validation_keeps_config_untouched() {
        let handler = number("shell.max_visible_lines");
        let mut config = Config::default();

        assert!(handler.set(&args(&["0"]), &mut config).is_err());
        assert!(handler.set(&args(&["1", "2"]), &mut config).is_err());
        assert_eq!(config.shell.max_visible_lines, None);

        handler.set(&args(&["25"]), &mut config).unwrap();
        assert_eq!(config.shell.max_visible_lines, Some(25));
        assert_eq!(config.multiplexer_options().max_visible_lines, 25);
    }

    #[test]
    fn strings_join_words() {
        let handler = string_handlers()
            .into_iter()
            .find(|h| h.key == "ai.system_prompt")
            .unwrap();
        let mut config = Config::default();
        handler
            .set(&args(&["Answer", "in", "haiku."]), &mut config)
            .unwrap();
        assert_eq!(config.ai.system_prompt.as_deref(), Some("Answer in haiku."));
        assert!(handler.set(&[], &mut config).is_err());
    }

    #[test]
    fn panel_styles_merge_and_clean_up() {
        let handlers = panel_style_handlers();
        assert_eq!(handlers.len(), 10);
        let border = handlers
            .iter()
            .find(|h| h.key == "ui.panel_styles.error.border")
            .unwrap();
        let mut config = Config::default();

        border.set(&args(&["red"]), &mut config).unwrap();
        let style = config.panel_style(FrameTone::Error);
        assert_eq!(style.border_style.as_deref(), Some("red"));
        assert_eq!(
            style.title_style,
            default_panel_style(FrameTone::Error).title_style
        );

        assert!(border.set(&args(&["sparkly"]), &mut config).is_err());

        border.unset(&mut config);
        assert!(config.ui.panel_styles.is_empty());
        assert!(border.format(&config).contains("#e78284"));
    }
}
