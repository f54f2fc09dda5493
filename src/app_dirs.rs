//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution. Both paths
//! can be overridden for tests or embedded deployments:
//! - `INTERLOCUTOR_CONFIG_DIR` overrides [`config_dir`]
//! - `INTERLOCUTOR_DATA_DIR` overrides [`data_dir`]

use std::path::PathBuf;

/// Application config directory (holds `config.toml`).
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("INTERLOCUTOR_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("interlocutor"))
        .unwrap_or_else(|| PathBuf::from("/tmp/interlocutor-config"))
}

/// Application data directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("INTERLOCUTOR_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("interlocutor"))
        .unwrap_or_else(|| PathBuf::from("/tmp/interlocutor-data"))
}

/// Default directory for rolling diagnostic logs.
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}
