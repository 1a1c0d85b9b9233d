//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `RELAY_*` environment variable overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use relay_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{BusBackend, RelaySettings};

/// Resolve the default settings file path (`~/.relay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus overrides). If the file
/// contains invalid JSON or the result fails validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

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

/// Apply `RELAY_*` environment variable overrides.
///
/// Invalid values are logged and ignored (file/default value stays).
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// `RELAY_REDIS_URL` sets both Redis URLs; the more specific
/// `RELAY_SESSION_REDIS_URL` / `RELAY_BUS_REDIS_URL` win over it.
pub fn apply_overrides(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("RELAY_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("RELAY_MAX_FRAME_BYTES", 64, 16 * 1024 * 1024) {
        settings.server.max_frame_bytes = v;
    }
    if let Some(v) = env.usize("RELAY_QUEUE_CAPACITY", 1, 65_536) {
        settings.server.outbound_queue_capacity = v;
    }
    if let Some(v) = env.u64("RELAY_READ_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.server.read_timeout_ms = v;
    }
    if let Some(v) = env.u64("RELAY_PING_INTERVAL_MS", 500, 3_600_000) {
        settings.server.ping_interval_ms = v;
    }
    if let Some(v) = env.bool("RELAY_METRICS_ENABLED") {
        settings.server.metrics_enabled = v;
    }

    // ── Redis (shared, then specific) ───────────────────────────────
    if let Some(v) = env.string("RELAY_REDIS_URL") {
        settings.session_store.redis_url.clone_from(&v);
        settings.bus.redis_url = v;
    }
    if let Some(v) = env.string("RELAY_SESSION_REDIS_URL") {
        settings.session_store.redis_url = v;
    }
    if let Some(v) = env.string("RELAY_SESSION_KEY_PREFIX") {
        settings.session_store.key_prefix = v;
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_STORAGE_URL") {
        settings.storage.base_url = v;
    }
    if let Some(v) = env.u64("RELAY_STORAGE_TIMEOUT_MS", 100, 120_000) {
        settings.storage.timeout_ms = v;
    }

    // ── Bus ─────────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_BUS_BACKEND") {
        match parse_bus_backend(&v) {
            Some(backend) => settings.bus.backend = backend,
            None => warn!(key = "RELAY_BUS_BACKEND", value = %v, "invalid bus backend, ignoring"),
        }
    }
    if let Some(v) = env.string("RELAY_BUS_REDIS_URL") {
        settings.bus.redis_url = v;
    }
    if let Some(v) = env.string("RELAY_BUS_CHANNEL") {
        settings.bus.channel = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("RELAY_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "RELAY_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

/// Check cross-field constraints that serde cannot express.
pub fn validate(settings: &RelaySettings) -> Result<()> {
    let server = &settings.server;
    if server.outbound_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.outboundQueueCapacity must be positive".into(),
        ));
    }
    if server.max_frame_bytes == 0 {
        return Err(SettingsError::InvalidValue(
            "server.maxFrameBytes must be positive".into(),
        ));
    }
    if server.ping_interval_ms == 0 || server.ping_interval_ms >= server.read_timeout_ms {
        return Err(SettingsError::InvalidValue(format!(
            "server.pingIntervalMs ({}) must be positive and shorter than server.readTimeoutMs ({})",
            server.ping_interval_ms, server.read_timeout_ms
        )));
    }
    if server.write_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "server.writeTimeoutMs must be positive".into(),
        ));
    }
    if settings.storage.base_url.trim().is_empty() {
        return Err(SettingsError::InvalidValue("storage.baseUrl is required".into()));
    }
    if settings.bus.channel.trim().is_empty() {
        return Err(SettingsError::InvalidValue("bus.channel is required".into()));
    }
    if settings.bus.backend == BusBackend::Memory && settings.bus.memory_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "bus.memoryCapacity must be positive".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
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

/// Parse a bus backend name.
pub fn parse_bus_backend(val: &str) -> Option<BusBackend> {
    match val.to_lowercase().as_str() {
        "redis" => Some(BusBackend::Redis),
        "memory" => Some(BusBackend::Memory),
        _ => None,
    }
}

/// Parse a log format name.
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "pretty" | "text" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = (self.lookup)(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
