//! Configuration loader for Pulse.
//!
//! Reads `config.toml` from the data directory (`~/.pulse/` by default) and
//! deserializes it into [`PulseConfig`]. Falls back to defaults when the file
//! is missing or malformed.

use std::path::{Path, PathBuf};

use pulse_types::config::PulseConfig;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "PULSE_DATA_DIR";

/// Resolve the data directory.
///
/// Priority: explicit override (CLI flag), then `PULSE_DATA_DIR`, then `~/.pulse`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pulse")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`PulseConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> PulseConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return PulseConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return PulseConfig::default();
        }
    };

    match toml::from_str::<PulseConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            PulseConfig::default()
        }
    }
}
