use std::collections::HashMap;

use ratatui::style::{Color, Modifier, Style};

use crate::core::config::data::PanelStyle;
use crate::core::config::Config;
use crate::ui::frame::FrameTone;

/// Resolved border and title styles for every frame tone.
#[derive(Debug, Clone)]
pub struct PanelTheme {
    styles: HashMap<FrameTone, (Style, Style)>,
}

impl PanelTheme {
    pub fn from_config(config: &Config) -> Self {
        let styles = FrameTone::all()
            .into_iter()
            .map(|tone| (tone, resolve(&config.panel_style(tone))))
            .collect();
        Self { styles }
    }

    pub fn border(&self, tone: FrameTone) -> Style {
        self.styles.get(&tone).map(|(border, _)| *border).unwrap_or_default()
    }

    pub fn title(&self, tone: FrameTone) -> Style {
        self.styles.get(&tone).map(|(_, title)| *title).unwrap_or_default()
    }
}

impl Default for PanelTheme {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn resolve(style: &PanelStyle) -> (Style, Style) {
    (
        parse_style(style.border_style.as_deref()),
        parse_style(style.title_style.as_deref()),
    )
}

/// Parse a style spec such as `bold #8caaee` or `italic,cyan`.
///
/// Unknown tokens are ignored.
pub fn parse_style(spec: Option<&str>) -> Style {
    let mut style = Style::default();
    let Some(spec) = spec else {
        return style;
    };

    for tok in spec
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if let Some(color) = parse_color(tok) {
            style = style.fg(color);
            continue;
        }
        match tok.to_ascii_lowercase().as_str() {
            "bold" => style = style.add_modifier(Modifier::BOLD),
            "dim" => style = style.add_modifier(Modifier::DIM),
            "italic" => style = style.add_modifier(Modifier::ITALIC),
            "reversed" => style = style.add_modifier(Modifier::REVERSED),
            "underline" => style = style.add_modifier(Modifier::UNDERLINED),
            _ => {}
        }
    }
    style
}

pub fn parse_color(s: &str) -> Option<Color> {
    let lower = s.trim().to_ascii_lowercase();
    // Hex: #rgb or #rrggbb
    if let Some(c) = parse_hex_color(&lower) {
        return Some(c);
    }
    if let Some(c) = parse_rgb_func(&lower) {
        return Some(c);
    }
    match lower.as_str() {
        "black" => Some(Color::Black),
        "white" => Some(Color::White),
        "gray" | "grey" => Some(Color::Gray),
        "dark_gray" | "dark-grey" | "darkgray" => Some(Color::DarkGray),
        "red" => Some(Color::Red),
        "light_red" | "light-red" => Some(Color::LightRed),
        "green" => Some(Color::Green),
        "light_green" | "light-green" => Some(Color::LightGreen),
        "blue" => Some(Color::Blue),
        "light_blue" | "light-blue" => Some(Color::LightBlue),
        "cyan" => Some(Color::Cyan),
        "light_cyan" | "light-cyan" => Some(Color::LightCyan),
        "magenta" => Some(Color::Magenta),
        "light_magenta" | "light-magenta" => Some(Color::LightMagenta),
        "yellow" => Some(Color::Yellow),
        "light_yellow" | "light-yellow" => Some(Color::LightYellow),
        "reset" => Some(Color::Reset),
        _ => None,
    }
}

fn parse_hex_color(s: &str) -> Option<Color> {
    let hex = s.strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    match hex.len() {
        3 => {
            let r = u8::from_str_radix(&hex[0..1].repeat(2), 16).ok()?;
            let g = u8::from_str_radix(&hex[1..2].repeat(2), 16).ok()?;
            let b = u8::from_str_radix(&hex[2..3].repeat(2), 16).ok()?;
            Some(Color::Rgb(r, g, b))
        }
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some(Color::Rgb(r, g, b))
        }
        _ => None,
    }
}

fn parse_rgb_func(s: &str) -> Option<Color> {
    let content = s.strip_prefix("rgb(")?.strip_suffix(')')?;
    let parts: Vec<_> = content
        .split([',', ' '])
        .filter(|t| !t.is_empty())
        .collect();
    if parts.len() != 3 {
        return None;
    }
    let r = parts[0].parse::<u16>().ok()?;
    let g = parts[1].parse::<u16>().ok()?;
    let b = parts[2].parse::<u16>().ok()?;
    Some(Color::Rgb(
        r.min(255) as u8,
        g.min(255) as u8,
        b.min(255) as u8,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_parse_in_all_notations() {
        assert_eq!(parse_color("#8caaee"), Some(Color::Rgb(0x8c, 0xaa, 0xee)));
        assert_eq!(parse_color("#fff"), Some(Color::Rgb(255, 255, 255)));
        assert_eq!(parse_color("rgb(300, 0, 12)"), Some(Color::Rgb(255, 0, 12)));
        assert_eq!(parse_color("Cyan"), Some(Color::Cyan));
        assert_eq!(parse_color("#12"), None);
        assert_eq!(parse_color("chartreuse-ish"), None);
    }

    #[test]
    fn style_spec_combines_color_and_modifiers() {
        let style = parse_style(Some("bold #a6d189"));
        assert_eq!(style.fg, Some(Color::Rgb(0xa6, 0xd1, 0x89)));
        assert!(style.add_modifier.contains(Modifier::BOLD));

        let style = parse_style(Some("italic,red,sparkly"));
        assert_eq!(style.fg, Some(Color::Red));
        assert!(style.add_modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn theme_uses_default_palette() {
        let theme = PanelTheme::default();
        assert_eq!(
            theme.border(FrameTone::Success).fg,
            Some(Color::Rgb(0xa6, 0xd1, 0x89))
        );
        assert!(theme
            .title(FrameTone::Info)
            .add_modifier
            .contains(Modifier::BOLD));
    }
}
