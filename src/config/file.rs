//! TOML configuration file loading
//!
//! Supports `~/.config/squobert/presence.toml` as a persistent config source.
//! All fields are optional. The file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Env var overriding the config file location
pub const CONFIG_PATH_ENV: &str = "SQUOBERT_PRESENCE_CONFIG";

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct PresenceConfigFile {
    /// Tracker timing
    #[serde(default)]
    pub tracker: TrackerFileConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Face-count source
    #[serde(default)]
    pub source: SourceFileConfig,
}

/// Tracker timing, in seconds
#[derive(Debug, Default, Deserialize)]
pub struct TrackerFileConfig {
    pub poll_interval_secs: Option<f64>,
    pub present_delay_secs: Option<f64>,
    pub absent_delay_secs: Option<f64>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Face-count source configuration
#[derive(Debug, Default, Deserialize)]
pub struct SourceFileConfig {
    /// "command", "http" or "scripted"
    pub kind: Option<String>,

    /// Detector program (command source)
    pub command: Option<String>,

    /// Extra detector arguments (command source)
    #[serde(default)]
    pub args: Vec<String>,

    /// Detector endpoint (http source)
    pub url: Option<String>,

    /// Face counts to replay, e.g. "0,1,1,1" (scripted source)
    pub script: Option<String>,

    /// Replay the script forever
    pub looping: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `PresenceConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> PresenceConfigFile {
    config_file_path().map_or_else(PresenceConfigFile::default, |path| load_from(&path))
}

/// Load a config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
pub fn load_from(path: &Path) -> PresenceConfigFile {
    if !path.exists() {
        return PresenceConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                PresenceConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            PresenceConfigFile::default()
        }
    }
}

/// Return the config file path
///
/// `$SQUOBERT_PRESENCE_CONFIG` if set, otherwise `~/.config/squobert/presence.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("squobert").join("presence.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let config = load_from(Path::new("/nonexistent/squobert/presence.toml"));
        assert!(config.tracker.poll_interval_secs.is_none());
        assert!(config.source.kind.is_none());
    }

    #[test]
    fn parses_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[tracker]
present_delay_secs = 2.5

[source]
kind = "command"
command = "python3"
args = ["detect_once.py", "--camera", "0"]
"#
        )
        .unwrap();

        let config = load_from(file.path());
        assert_eq!(config.tracker.present_delay_secs, Some(2.5));
        assert!(config.tracker.absent_delay_secs.is_none());
        assert!(config.server.port.is_none());
        assert_eq!(config.source.kind.as_deref(), Some("command"));
        assert_eq!(config.source.args.len(), 3);
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tracker\npoll_interval_secs = ").unwrap();

        let config = load_from(file.path());
        assert!(config.tracker.poll_interval_secs.is_none());
    }
}
