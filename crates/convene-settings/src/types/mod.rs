//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may be partial: missing fields keep their compiled default.

mod generator;
mod runtime;
mod server;

pub use generator::*;
pub use runtime::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "lifecycle": { "broadcastEvery": 30 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConveneSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// HTTP surface.
    pub server: ServerSettings,
    /// Chat platform REST endpoint.
    pub platform: PlatformSettings,
    /// Waiting pool and admission watchdog.
    pub matchmaking: MatchmakingSettings,
    /// Countdown, grace period and dropout handling.
    pub lifecycle: LifecycleSettings,
    /// Participant moves.
    pub redirect: RedirectSettings,
    /// Reply scheduling and typing pacing.
    pub reply: ReplySettings,
    /// Reply generator backend.
    pub generator: GeneratorSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for ConveneSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: convene_core::constants::NAME.to_string(),
            server: ServerSettings::default(),
            platform: PlatformSettings::default(),
            matchmaking: MatchmakingSettings::default(),
            lifecycle: LifecycleSettings::default(),
            redirect: RedirectSettings::default(),
            reply: ReplySettings::default(),
            generator: GeneratorSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
