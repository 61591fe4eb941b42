//! Helper functions for settings operations.

use crate::core::config::data::Config;

use super::error::SettingError;

/// Load, change and save the config file, flattening both error layers.
pub fn mutate_config<F>(f: F) -> Result<String, SettingError>
where
    F: FnOnce(&mut Config) -> Result<String, SettingError>,
{
    Config::mutate(f).map_err(|e| SettingError::ConfigError(e.to_string()))?
}

/// Parse a boolean value from user input.
///
/// Accepts: on/off, true/false, yes/no, 1/0 (case-insensitive).
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Format a boolean value for display.
pub fn format_bool(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

pub fn parse_number(key: &'static str, input: &str, min: u64) -> Result<u64, SettingError> {
    input
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|value| *value >= min)
        .ok_or_else(|| SettingError::InvalidNumber {
            key,
            input: input.to_string(),
            min,
        })
}

pub fn success_set(key: &str, display: &str) -> String {
    format!("✅ Set {key} to: {display}")
}

/// Shorten `text` for one-line display.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let kept: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_accept_common_spellings() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn numbers_respect_minimum() {
        assert_eq!(parse_number("k", " 12 ", 1).unwrap(), 12);
        assert!(matches!(
            parse_number("k", "0", 1),
            Err(SettingError::InvalidNumber { min: 1, .. })
        ));
        assert!(parse_number("k", "-3", 0).is_err());
    }

    #[test]
    fn long_values_are_shortened() {
        assert_eq!(truncate_with_ellipsis("abcdefgh", 6), "abc...");
        assert_eq!(truncate_with_ellipsis("a\nb", 6), "a b");
    }
}
