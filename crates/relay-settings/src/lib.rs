//! # relay-settings
//!
//! Configuration management with layered sources for the relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.relay/settings.json` or `--config` (deep-merged over defaults)
//! 3. **Environment variables**: `RELAY_*` overrides (highest priority)
//!
//! The merged result is validated before it is returned.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let settings = RelaySettings::default();
        assert!(validate(&settings).is_ok());
        assert!(settings_path().ends_with(".relay/settings.json"));
    }

    #[test]
    fn default_settings_are_sane() {
        let settings = RelaySettings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.session_store.key_prefix, "session:");
        assert_eq!(settings.storage.timeout_ms, 5_000);
        assert_eq!(settings.bus.backend, BusBackend::Redis);
        assert_eq!(settings.logging.level, "info");
    }
}
