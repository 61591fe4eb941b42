//! Settings management for the `set` and `unset` subcommands.
//!
//! Every config key has a handler; most are data-driven (see
//! [`handlers`]) with getter and setter function pointers into [`Config`].

pub mod error;
pub mod handlers;
pub mod helpers;
pub mod registry;

pub use error::SettingError;
pub use registry::SettingRegistry;

use crate::core::config::data::Config;

/// Trait for handling a configuration setting.
///
/// Handlers change an in-memory [`Config`]; loading and saving happen around
/// them in [`helpers::mutate_config`].
pub trait SettingHandler: Send + Sync {
    /// Returns the configuration key this handler manages.
    fn key(&self) -> &'static str;

    /// Set the value from the words following the key, returning a message.
    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError>;

    /// Clear the value so the default applies again.
    fn unset(&self, config: &mut Config) -> String;

    /// Format the current value for display in `simpl set` output.
    fn format(&self, config: &Config) -> String;
}

/// Apply `simpl set <key> <value…>` to the config file.
pub fn set_key(
    registry: &SettingRegistry,
    key: &str,
    args: &[String],
) -> Result<String, SettingError> {
    let handler = registry
        .get(key)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
    helpers::mutate_config(|config| handler.set(args, config))
}

/// Apply `simpl unset <key>` to the config file.
pub fn unset_key(registry: &SettingRegistry, key: &str) -> Result<String, SettingError> {
    let handler = registry
        .get(key)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
    helpers::mutate_config(|config| Ok(handler.unset(config)))
}
