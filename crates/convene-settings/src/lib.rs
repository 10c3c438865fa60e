//! # convene-settings
//!
//! Process configuration and per-bot registration records.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ConveneSettings::default()`]
//! 2. **User file**: `~/.convene/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables**: `CONVENE_*` overrides (highest priority)
//!
//! A [`BotSetup`] is not part of the settings file. It arrives with each bot
//! registration and stays immutable for that bot's lifetime.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod setup;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use setup::{BotRole, BotSetup};
pub use types::*;
