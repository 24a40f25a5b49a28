//! Debounced presence state machine
//!
//! Pure and clock-injected: every call to [`PresenceState::on_tick`] carries
//! the instant the sample was taken, so the hysteresis can be exercised
//! without a camera or a running loop.

use std::time::{Duration, Instant};

use super::{PresenceEvent, TrackerConfig};

/// Hysteresis state for one tracker
#[derive(Debug, Clone)]
pub struct PresenceState {
    config: TrackerConfig,
    present: bool,
    presence_started_at: Option<Instant>,
    absence_started_at: Option<Instant>,
    last_face_count: usize,
}

impl PresenceState {
    /// Create an absent state with no running timers
    #[must_use]
    pub const fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            present: false,
            presence_started_at: None,
            absence_started_at: None,
            last_face_count: 0,
        }
    }

    /// Current debounced presence
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.present
    }

    /// Face count seen on the last successful tick
    #[must_use]
    pub const fn last_face_count(&self) -> usize {
        self.last_face_count
    }

    /// When the current run of positive ticks began
    #[must_use]
    pub const fn presence_started_at(&self) -> Option<Instant> {
        self.presence_started_at
    }

    /// When the current run of empty ticks began (only while present)
    #[must_use]
    pub const fn absence_started_at(&self) -> Option<Instant> {
        self.absence_started_at
    }

    /// Evaluate one successful sample
    ///
    /// Returns the events produced by this tick: at most one
    /// `PresenceChanged` followed by at most one session transition.
    pub fn on_tick(&mut self, now: Instant, face_count: usize) -> Vec<PresenceEvent> {
        let mut events = Vec::new();

        if face_count != self.last_face_count {
            tracing::debug!(
                previous = self.last_face_count,
                face_count,
                "face count changed"
            );
            self.last_face_count = face_count;
            events.push(PresenceEvent::PresenceChanged { face_count });
        }

        if face_count > 0 {
            self.absence_started_at = None;
            let since = *self.presence_started_at.get_or_insert(now);

            if !self.present && self.sustained(now, since) >= self.config.present_delay {
                self.present = true;
                tracing::info!(face_count, "presence sustained, session start");
                events.push(PresenceEvent::SessionStart);
            }
        } else {
            self.presence_started_at = None;

            if self.present {
                let since = *self.absence_started_at.get_or_insert(now);

                if self.sustained(now, since) >= self.config.absent_delay {
                    self.present = false;
                    self.absence_started_at = None;
                    tracing::info!("absence sustained, session end");
                    events.push(PresenceEvent::SessionEnd);
                }
            }
        }

        events
    }

    /// Drop all timers and return to the initial absent state
    pub fn reset(&mut self) {
        self.present = false;
        self.presence_started_at = None;
        self.absence_started_at = None;
        self.last_face_count = 0;
    }

    /// Observed duration of a run that began at `since`
    ///
    /// Each sample covers one poll interval, so a run of N ticks spans
    /// N intervals.
    fn sustained(&self, now: Instant, since: Instant) -> Duration {
        now.saturating_duration_since(since) + self.config.poll_interval
    }
}
