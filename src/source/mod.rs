//! Face-count sources
//!
//! The camera and classifier are an external black box. A [`FaceSource`]
//! wraps whatever produces the per-tick face count: a scripted sequence,
//! an external detector program, or a remote detector over HTTP.
//!
//! All methods are blocking. The tracker only calls them from the blocking
//! thread pool, one at a time, so implementations may freely do device or
//! network IO.

pub mod command;
pub mod http;
pub mod scripted;

pub use command::CommandSource;
pub use http::HttpSource;
pub use scripted::{ScriptStep, ScriptedSource};

use std::sync::Arc;

use tokio::sync::watch;

use crate::Result;

/// Shared flag asking an in-flight capture to give up
///
/// Handed out by sources whose capture can block for long (an external
/// program, say). The tracker trips it when stopping mid-tick.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }
}

impl CancelToken {
    /// Ask the current and any later capture to stop
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    /// Clear a previous cancellation
    pub fn reset(&self) {
        self.flag.send_replace(false);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Produces one face count per tick
pub trait FaceSource: Send + 'static {
    /// Short description used in logs and the status surface
    fn name(&self) -> String;

    /// Acquire the underlying capture resource
    ///
    /// # Errors
    ///
    /// Returns `Error::SourceUnavailable` if the resource cannot be opened.
    /// The tracker does not retry.
    fn acquire(&mut self) -> Result<()>;

    /// Capture one frame and count the faces in it
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` for a failed tick. The tracker skips the
    /// tick and keeps its timers.
    fn capture_and_count(&mut self) -> Result<usize>;

    /// Release the capture resource. Must be safe to call when not acquired.
    fn release(&mut self);

    /// Token that interrupts `capture_and_count` from another thread
    ///
    /// Sources whose capture always finishes quickly keep the default.
    fn cancel_token(&self) -> Option<CancelToken> {
        None
    }
}

impl FaceSource for Box<dyn FaceSource> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn acquire(&mut self) -> Result<()> {
        (**self).acquire()
    }

    fn capture_and_count(&mut self) -> Result<usize> {
        (**self).capture_and_count()
    }

    fn release(&mut self) {
        (**self).release();
    }

    fn cancel_token(&self) -> Option<CancelToken> {
        (**self).cancel_token()
    }
}

/// Parse a detector's textual output into a face count
///
/// Accepts a bare integer, taking the last non-empty line so detectors may
/// log before printing the result.
pub(crate) fn parse_face_count(output: &str) -> Option<usize> {
    output
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .and_then(|line| line.parse().ok())
}
