//! Presence detection
//!
//! Turns a noisy per-tick face count into a debounced "someone is here"
//! signal and edge-triggered session events.

pub mod state;
pub mod tracker;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use state::PresenceState;
pub use tracker::PresenceTracker;

/// Default time between detections
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default sustained presence required before a session starts
pub const DEFAULT_PRESENT_DELAY: Duration = Duration::from_secs(5);

/// Default sustained absence required before a session ends
pub const DEFAULT_ABSENT_DELAY: Duration = Duration::from_secs(5);

/// Timing for a presence tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Time between ticks
    pub poll_interval: Duration,
    /// Sustained presence before `SessionStart`
    pub present_delay: Duration,
    /// Sustained absence before `SessionEnd`
    pub absent_delay: Duration,
}

impl TrackerConfig {
    /// Build a validated tracker configuration
    ///
    /// # Errors
    ///
    /// Returns error if any duration is zero
    pub fn new(
        poll_interval: Duration,
        present_delay: Duration,
        absent_delay: Duration,
    ) -> Result<Self> {
        let config = Self {
            poll_interval,
            present_delay,
            absent_delay,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from fractional seconds
    ///
    /// # Errors
    ///
    /// Returns error if any value is not a positive, finite number
    pub fn from_secs_f64(
        poll_interval: f64,
        present_delay: f64,
        absent_delay: f64,
    ) -> Result<Self> {
        Self::new(
            positive_secs("poll_interval", poll_interval)?,
            positive_secs("present_delay", present_delay)?,
            positive_secs("absent_delay", absent_delay)?,
        )
    }

    /// Check that every duration is strictly positive
    ///
    /// # Errors
    ///
    /// Returns error naming the first zero duration
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("poll_interval", self.poll_interval),
            ("present_delay", self.present_delay),
            ("absent_delay", self.absent_delay),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            present_delay: DEFAULT_PRESENT_DELAY,
            absent_delay: DEFAULT_ABSENT_DELAY,
        }
    }
}

fn positive_secs(name: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(Error::Config(format!(
            "{name} must be a positive number of seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Config(format!("{name} out of range: {e}")))
}

/// Event delivered to tracker subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceEvent {
    /// Someone has been in view for the present delay
    SessionStart,
    /// Nobody has been in view for the absent delay
    SessionEnd,
    /// Raw face count differs from the previous tick
    PresenceChanged { face_count: usize },
}

impl PresenceEvent {
    /// Whether this event is a debounced session transition
    #[must_use]
    pub const fn is_session_transition(&self) -> bool {
        matches!(self, Self::SessionStart | Self::SessionEnd)
    }
}

/// Snapshot served to status consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStatus {
    pub present: bool,
    pub face_count: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Human-readable name of the face-count source
    pub source: String,
}

impl PresenceStatus {
    /// Initial status for a tracker reading from `source`
    #[must_use]
    pub fn idle(source: impl Into<String>) -> Self {
        Self {
            present: false,
            face_count: 0,
            last_update: None,
            error: None,
            source: source.into(),
        }
    }
}
