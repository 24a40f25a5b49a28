//! Shared test utilities

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use squobert_presence::api::{self, ApiState};
use squobert_presence::{Error, FaceSource, PresenceTracker, Result, TrackerConfig};
use tokio::net::TcpListener;

/// Handle for steering and inspecting a [`ProbeSource`] from the test
#[derive(Clone, Default)]
pub struct Probe {
    inner: Arc<ProbeState>,
}

#[derive(Default)]
struct ProbeState {
    faces: AtomicUsize,
    fault: AtomicBool,
    fail_acquire: AtomicBool,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    captures_started: AtomicUsize,
    captures_finished: AtomicUsize,
    capturing: AtomicBool,
    released_mid_capture: AtomicBool,
}

impl Probe {
    pub fn set_faces(&self, faces: usize) {
        self.inner.faces.store(faces, Ordering::SeqCst);
    }

    pub fn set_fault(&self, fault: bool) {
        self.inner.fault.store(fault, Ordering::SeqCst);
    }

    pub fn fail_acquire(&self) {
        self.inner.fail_acquire.store(true, Ordering::SeqCst);
    }

    pub fn acquires(&self) -> usize {
        self.inner.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    pub fn captures_started(&self) -> usize {
        self.inner.captures_started.load(Ordering::SeqCst)
    }

    pub fn captures_finished(&self) -> usize {
        self.inner.captures_finished.load(Ordering::SeqCst)
    }

    pub fn is_capturing(&self) -> bool {
        self.inner.capturing.load(Ordering::SeqCst)
    }

    pub fn released_mid_capture(&self) -> bool {
        self.inner.released_mid_capture.load(Ordering::SeqCst)
    }
}

/// Face source driven by a [`Probe`], with an optional slow capture
pub struct ProbeSource {
    probe: Probe,
    capture_delay: Duration,
}

impl ProbeSource {
    pub fn new() -> (Self, Probe) {
        Self::with_capture_delay(Duration::ZERO)
    }

    pub fn with_capture_delay(capture_delay: Duration) -> (Self, Probe) {
        let probe = Probe::default();
        (
            Self {
                probe: probe.clone(),
                capture_delay,
            },
            probe,
        )
    }
}

impl FaceSource for ProbeSource {
    fn name(&self) -> String {
        "probe".to_string()
    }

    fn acquire(&mut self) -> Result<()> {
        let state = &self.probe.inner;
        if state.fail_acquire.load(Ordering::SeqCst) {
            return Err(Error::SourceUnavailable("probe camera missing".to_string()));
        }
        state.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn capture_and_count(&mut self) -> Result<usize> {
        let state = &self.probe.inner;
        state.captures_started.fetch_add(1, Ordering::SeqCst);
        state.capturing.store(true, Ordering::SeqCst);

        if !self.capture_delay.is_zero() {
            std::thread::sleep(self.capture_delay);
        }

        state.capturing.store(false, Ordering::SeqCst);
        state.captures_finished.fetch_add(1, Ordering::SeqCst);

        if state.fault.load(Ordering::SeqCst) {
            return Err(Error::Capture("probe frame dropped".to_string()));
        }
        Ok(state.faces.load(Ordering::SeqCst))
    }

    fn release(&mut self) {
        let state = &self.probe.inner;
        if state.capturing.load(Ordering::SeqCst) {
            state.released_mid_capture.store(true, Ordering::SeqCst);
        }
        state.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Tracker timing fast enough for tests
#[must_use]
pub fn fast_config() -> TrackerConfig {
    TrackerConfig::new(
        Duration::from_millis(10),
        Duration::from_millis(100),
        Duration::from_millis(100),
    )
    .expect("valid test config")
}

/// Create a stopped tracker over a fresh probe
#[must_use]
pub fn probe_tracker(config: TrackerConfig) -> (Arc<PresenceTracker>, Probe) {
    let (source, probe) = ProbeSource::new();
    (Arc::new(PresenceTracker::new(source, config)), probe)
}

/// Build the full API router around a tracker
#[must_use]
pub fn build_router(tracker: Arc<PresenceTracker>) -> axum::Router {
    api::router(Arc::new(ApiState { tracker }))
}

/// Serve the API on an ephemeral local port
pub async fn spawn_server(tracker: Arc<PresenceTracker>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(tracker);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Poll `condition` until it holds, panicking after a few seconds
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
