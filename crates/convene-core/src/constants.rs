//! Package-level constants.

/// Current version of convene (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "convene";

/// Directory under `$HOME` holding the settings file.
pub const SETTINGS_DIR: &str = ".convene";

/// Settings file name inside [`SETTINGS_DIR`].
pub const SETTINGS_FILE: &str = "settings.json";

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "CONVENE_";
