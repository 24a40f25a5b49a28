//! Configuration management for the presence service
//!
//! Values resolve as env > TOML file > defaults. Env names for the tracker
//! and server (`DETECTION_INTERVAL`, `HOST`, `PORT`, ...) match what the
//! presence service has always read.

pub mod file;

use std::time::Duration;

use crate::presence::{
    DEFAULT_ABSENT_DELAY, DEFAULT_POLL_INTERVAL, DEFAULT_PRESENT_DELAY, TrackerConfig,
};
use crate::source::{CommandSource, FaceSource, HttpSource, ScriptedSource};
use crate::{Error, Result};

use self::file::PresenceConfigFile;

/// Default bind address
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port
pub const DEFAULT_PORT: u16 = 8765;

/// Presence service configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Tracker timing
    pub tracker: TrackerConfig,

    /// HTTP API server configuration
    pub server: ServerConfig,

    /// Face-count source, if one is configured
    pub source: Option<SourceConfig>,
}

/// HTTP API server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Which face-count source to poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    /// Run a detector program each tick
    Command { program: String, args: Vec<String> },
    /// Poll a detector endpoint
    Http { url: String },
    /// Replay a fixed script
    Scripted { script: String, looping: bool },
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn resolve<F>(fc: PresenceConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tracker = TrackerConfig::from_secs_f64(
            secs(&env, "DETECTION_INTERVAL", fc.tracker.poll_interval_secs, DEFAULT_POLL_INTERVAL)?,
            secs(&env, "PRESENT_DELAY", fc.tracker.present_delay_secs, DEFAULT_PRESENT_DELAY)?,
            secs(&env, "ABSENT_DELAY", fc.tracker.absent_delay_secs, DEFAULT_ABSENT_DELAY)?,
        )?;

        let port = match env("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("PORT must be a port number, got {raw:?}")))?,
            None => fc.server.port.unwrap_or(DEFAULT_PORT),
        };

        let server = ServerConfig {
            host: env("HOST")
                .or(fc.server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
        };

        let source = resolve_source(&env, fc.source)?;

        Ok(Self {
            tracker,
            server,
            source,
        })
    }

    /// Build the configured face-count source
    ///
    /// # Errors
    ///
    /// Returns error if no source is configured or its settings are invalid
    pub fn build_source(&self) -> Result<Box<dyn FaceSource>> {
        let source = self.source.as_ref().ok_or_else(|| {
            Error::Config(
                "no face source configured (set SQUOBERT_DETECTOR_CMD, SQUOBERT_DETECTOR_URL \
                 or SQUOBERT_SCRIPT)"
                    .to_string(),
            )
        })?;

        let built: Box<dyn FaceSource> = match source {
            SourceConfig::Command { program, args } => {
                Box::new(CommandSource::new(program.clone(), args.clone()))
            }
            SourceConfig::Http { url } => {
                // A request may take at most one tick, but never less than a second
                let timeout = self.tracker.poll_interval.max(Duration::from_secs(1));
                Box::new(HttpSource::new(url.clone(), timeout))
            }
            SourceConfig::Scripted { script, looping } => {
                let scripted: ScriptedSource = script.parse()?;
                Box::new(if *looping { scripted.looping() } else { scripted })
            }
        };

        Ok(built)
    }
}

/// Resolve one duration in seconds from env, then file, then default
fn secs<F>(env: &F, key: &str, file_value: Option<f64>, default: Duration) -> Result<f64>
where
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be a number of seconds, got {raw:?}"))),
        None => Ok(file_value.unwrap_or_else(|| default.as_secs_f64())),
    }
}

/// Pick the source kind and its settings
///
/// An explicit kind wins; otherwise the first configured detector among
/// command, url and script is used.
fn resolve_source<F>(env: &F, fc: file::SourceFileConfig) -> Result<Option<SourceConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    let command = env("SQUOBERT_DETECTOR_CMD").or(fc.command);
    let url = env("SQUOBERT_DETECTOR_URL").or(fc.url);
    let script = env("SQUOBERT_SCRIPT").or(fc.script);
    let looping = fc.looping.unwrap_or(true);

    let kind = env("SQUOBERT_SOURCE").or(fc.kind).or_else(|| {
        if command.is_some() {
            Some("command".to_string())
        } else if url.is_some() {
            Some("http".to_string())
        } else if script.is_some() {
            Some("scripted".to_string())
        } else {
            None
        }
    });

    let Some(kind) = kind else {
        return Ok(None);
    };

    let source = match kind.trim().to_lowercase().as_str() {
        "command" => {
            let command = command.ok_or_else(|| {
                Error::Config("command source needs a detector command".to_string())
            })?;
            let mut parts = command.split_whitespace().map(ToString::to_string);
            let program = parts
                .next()
                .ok_or_else(|| Error::Config("detector command is empty".to_string()))?;
            let mut args: Vec<String> = parts.collect();
            args.extend(fc.args);
            SourceConfig::Command { program, args }
        }
        "http" => SourceConfig::Http {
            url: url.ok_or_else(|| Error::Config("http source needs a detector url".to_string()))?,
        },
        "scripted" => SourceConfig::Scripted {
            script: script
                .ok_or_else(|| Error::Config("scripted source needs a script".to_string()))?,
            looping,
        },
        other => {
            return Err(Error::Config(format!(
                "unknown source kind {other:?} (expected command, http or scripted)"
            )));
        }
    };

    Ok(Some(source))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::file::{ServerFileConfig, SourceFileConfig, TrackerFileConfig};

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env_or_file() {
        let config = Config::resolve(PresenceConfigFile::default(), env_of(&[])).unwrap();

        assert_eq!(config.tracker, TrackerConfig::default());
        assert_eq!(config.server, ServerConfig::default());
        assert!(config.source.is_none());
        assert!(config.build_source().is_err());
    }

    #[test]
    fn env_overrides_file() {
        let fc = PresenceConfigFile {
            tracker: TrackerFileConfig {
                poll_interval_secs: Some(2.0),
                present_delay_secs: Some(8.0),
                absent_delay_secs: None,
            },
            server: ServerFileConfig {
                host: Some("127.0.0.1".to_string()),
                port: Some(9000),
            },
            source: SourceFileConfig::default(),
        };

        let config = Config::resolve(fc, env_of(&[("DETECTION_INTERVAL", "0.5"), ("PORT", "9100")]))
            .unwrap();

        assert_eq!(config.tracker.poll_interval, Duration::from_millis(500));
        assert_eq!(config.tracker.present_delay, Duration::from_secs(8));
        assert_eq!(config.tracker.absent_delay, DEFAULT_ABSENT_DELAY);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let resolve = |pairs: &[(&str, &str)]| {
            Config::resolve(PresenceConfigFile::default(), env_of(pairs))
        };

        assert!(resolve(&[("PORT", "http")]).is_err());
        assert!(resolve(&[("ABSENT_DELAY", "0")]).is_err());
        assert!(resolve(&[("SQUOBERT_SOURCE", "camera")]).is_err());
    }

    #[test]
    fn source_kind_is_inferred() {
        let config = Config::resolve(
            PresenceConfigFile::default(),
            env_of(&[("SQUOBERT_DETECTOR_CMD", "python3 detect_once.py --camera 1")]),
        )
        .unwrap();

        assert_eq!(
            config.source,
            Some(SourceConfig::Command {
                program: "python3".to_string(),
                args: vec![
                    "detect_once.py".to_string(),
                    "--camera".to_string(),
                    "1".to_string()
                ],
            })
        );
    }

    #[test]
    fn explicit_kind_requires_its_setting() {
        let err = Config::resolve(
            PresenceConfigFile::default(),
            env_of(&[("SQUOBERT_SOURCE", "http")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn builds_scripted_source() {
        let config = Config::resolve(
            PresenceConfigFile::default(),
            env_of(&[("SQUOBERT_SCRIPT", "0,1,1")]),
        )
        .unwrap();

        let source = config.build_source().unwrap();
        assert_eq!(source.name(), "scripted (3 ticks)");
    }
}
