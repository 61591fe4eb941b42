//! Registry of setting handlers.

use std::collections::HashMap;

use super::handlers::{boolean_handlers, number_handlers, panel_style_handlers, string_handlers};
use super::SettingHandler;
use crate::core::config::data::Config;

/// Registry of all available setting handlers.
pub struct SettingRegistry {
    handlers: HashMap<&'static str, Box<dyn SettingHandler>>,
    /// Keys in display order for `simpl set` output.
    display_order: Vec<&'static str>,
}

impl SettingRegistry {
    /// Create a new registry with all handlers registered.
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
            display_order: Vec::new(),
        };

        for handler in string_handlers().into_iter().take(1) {
            registry.register(Box::new(handler));
        }
        for handler in boolean_handlers() {
            registry.register(Box::new(handler));
        }
        for handler in number_handlers() {
            registry.register(Box::new(handler));
        }
        for handler in string_handlers().into_iter().skip(1) {
            registry.register(Box::new(handler));
        }
        for handler in panel_style_handlers() {
            registry.register(Box::new(handler));
        }

        registry
    }

    fn register(&mut self, handler: Box<dyn SettingHandler>) {
        let key = handler.key();
        self.display_order.push(key);
        self.handlers.insert(key, handler);
    }

    /// Get a handler by key.
    pub fn get(&self, key: &str) -> Option<&dyn SettingHandler> {
        self.handlers.get(key).map(|h| h.as_ref())
    }

    /// Get all keys in display order.
    pub fn keys_display_order(&self) -> &[&'static str] {
        &self.display_order
    }

    /// One formatted line per key, in display order.
    pub fn describe(&self, config: &Config) -> Vec<String> {
        self.display_order
            .iter()
            .filter_map(|key| self.get(key))
            .map(|handler| handler.format(config))
            .collect()
    }
}

impl Default for SettingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_config_key_is_registered_once() {
        let registry = SettingRegistry::new();
        let keys = registry.keys_display_order();
        assert_eq!(keys.len(), 22);
        assert_eq!(keys[0], "shell.default_shell");
        assert!(registry.get("ai.model").is_some());
        assert!(registry.get("ui.panel_styles.warning.title").is_some());
        assert!(registry.get("markdown").is_none());

        let mut unique = keys.to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn describe_shows_defaults_for_unset_keys() {
        let lines = SettingRegistry::new().describe(&Config::default());
        assert!(lines.contains(&"  shell.max_visible_lines: (unset, default: 15)".to_string()));
    }
}
