use crate::core::config::data::{path_display, Config};
use crate::ui::frame::FrameTone;

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

impl Config {
    /// Effective settings, after environment overrides and defaults.
    pub fn describe(&self) -> Vec<String> {
        let shell = self.multiplexer_options();
        let ai = self.generation_options();
        let mut lines = vec![
            format!("  shell.default_shell: {}", self.shell_program()),
            format!(
                "  shell.stream_summary_panel: {}",
                on_off(shell.summary_panel)
            ),
            format!(
                "  shell.stream_output_panel: {}",
                on_off(shell.output_panel)
            ),
            format!("  shell.max_visible_lines: {}", shell.max_visible_lines),
            format!(
                "  shell.poll_interval_ms: {}",
                shell.poll_interval.as_millis()
            ),
            format!("  shell.exit_wait_ms: {}", shell.exit_wait.as_millis()),
            format!(
                "  shell.max_exit_wait_ms: {}",
                shell.max_exit_wait.as_millis()
            ),
            format!("  ui.refresh_per_second: {}", ai.refresh_per_second),
            format!("  ui.ai_max_visible_lines: {}", ai.max_visible_lines),
            format!(
                "  ai.model: {}",
                self.ai.model.as_deref().unwrap_or("(unset)")
            ),
            format!(
                "  ai.base_url: {}",
                self.ai.base_url.as_deref().unwrap_or("(unset)")
            ),
            format!(
                "  ai.system_prompt: {}",
                if self.ai.system_prompt.is_some() {
                    "(custom)"
                } else {
                    "(default)"
                }
            ),
        ];

        for tone in FrameTone::all() {
            let style = self.panel_style(tone);
            lines.push(format!(
                "  ui.panel_styles.{}: border={} title={}",
                tone.key(),
                style.border_style.unwrap_or_default(),
                style.title_style.unwrap_or_default()
            ));
        }
        lines
    }

    pub fn print_all(&self) {
        match Self::config_path() {
            Some(path) => println!("Current configuration ({}):", path_display(path)),
            None => println!("Current configuration:"),
        }
        for line in self.describe() {
            println!("{line}");
        }
    }
}
