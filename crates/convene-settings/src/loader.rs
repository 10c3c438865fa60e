//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ConveneSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `CONVENE_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use convene_core::LogFormat;
use convene_core::constants::{SETTINGS_DIR, SETTINGS_FILE};
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{ConveneSettings, GeneratorKind, LogLevel};

/// Resolve the default settings file path (`~/.convene/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(SETTINGS_DIR).join(SETTINGS_FILE)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ConveneSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<ConveneSettings> {
    let mut settings = merge_file_over_defaults(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn merge_file_over_defaults(path: &Path) -> Result<ConveneSettings> {
    let defaults = serde_json::to_value(ConveneSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Integers must parse and fall within range, booleans accept
/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`. Invalid values are
/// ignored with a warning.
pub fn apply_env_overrides(settings: &mut ConveneSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("CONVENE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("CONVENE_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_usize("CONVENE_MAX_BOTS", 1, 10_000) {
        settings.server.max_bots = v;
    }
    if let Some(v) = read_env_usize("CONVENE_EVENT_QUEUE", 1, 1_000_000) {
        settings.server.event_queue_capacity = v;
    }

    // ── Platform ────────────────────────────────────────────────────
    if let Some(v) = read_env_string("CONVENE_PLATFORM_URL") {
        settings.platform.base_url = v;
    }
    if let Some(v) = read_env_u64("CONVENE_PLATFORM_TIMEOUT_MS", 100, 600_000) {
        settings.platform.request_timeout_ms = v;
    }

    // ── Timing ──────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("CONVENE_POLL_INTERVAL_MS", 10, 60_000) {
        settings.matchmaking.poll_interval_ms = v;
    }
    if let Some(v) = read_env_u64("CONVENE_TICK_INTERVAL_MS", 10, 60_000) {
        settings.lifecycle.tick_interval_ms = v;
    }
    if let Some(v) = read_env_u64("CONVENE_BROADCAST_EVERY", 1, 86_400) {
        settings.lifecycle.broadcast_every = v;
    }
    if let Some(v) = read_env_u64("CONVENE_GRACE_PERIOD_MS", 0, 600_000) {
        settings.lifecycle.grace_period_ms = v;
    }
    if let Some(v) = read_env_usize("CONVENE_TRANSCRIPT_CAP", 1, 100_000) {
        settings.reply.transcript_cap = v;
    }

    // ── Generator ───────────────────────────────────────────────────
    if let Some(v) = read_env_parsed::<GeneratorKind>("CONVENE_GENERATOR") {
        settings.generator.kind = v;
    }
    if let Some(v) = read_env_string("CONVENE_GENERATOR_URL") {
        settings.generator.base_url = v;
    }
    if let Some(v) = read_env_string("CONVENE_GENERATOR_MODEL") {
        settings.generator.model = v;
    }
    if let Some(v) = read_env_bool("CONVENE_RELEVANCE_GATE") {
        settings.generator.relevance_gate = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("CONVENE_LOG_LEVEL")
        .and_then(|v| serde_json::from_value::<LogLevel>(Value::String(v.to_lowercase())).ok())
    {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_parsed::<LogFormat>("CONVENE_LOG_FORMAT") {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

fn read_env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let val = read_env_string(name)?;
    let result = val.parse().ok();
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "unrecognized env var value, ignoring");
    }
    result
}
