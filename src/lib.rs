//! Squobert Presence - debounced face-presence tracking for the Squobert bot
//!
//! This library provides the presence side of the bot:
//! - A hysteresis state machine turning noisy face counts into sessions
//! - A background tracker polling a face-count source
//! - Face-count sources (detector command, detector endpoint, scripted replay)
//! - An HTTP and WebSocket API publishing status and session events
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Face sources                       │
//! │     Command  │  HTTP detector  │  Scripted          │
//! └────────────────────┬────────────────────────────────┘
//!                      │ face count per tick
//! ┌────────────────────▼────────────────────────────────┐
//! │                Presence tracker                      │
//! │   Poll loop  │  Hysteresis  │  Status  │  Events    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                      API                             │
//! │   /status  │  /health  │  /ws  │  /ws/events        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod presence;
pub mod source;

pub use config::Config;
pub use error::{Error, Result};
pub use presence::{PresenceEvent, PresenceState, PresenceStatus, PresenceTracker, TrackerConfig};
pub use source::FaceSource;
