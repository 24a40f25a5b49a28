//! Presence tracker
//!
//! Owns a face-count source and a background polling task. Each tick runs
//! the capture on the blocking pool, feeds the result through
//! [`PresenceState`], publishes the new status and broadcasts any events.
//!
//! The source moves into the polling task on `start()` and comes back out
//! when the task finishes, so it is never touched by two threads at once.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{PresenceEvent, PresenceState, PresenceStatus, TrackerConfig};
use crate::source::FaceSource;
use crate::{Error, Result};

/// Channel capacity for presence events
const CHANNEL_CAPACITY: usize = 64;

type BoxedSource = Box<dyn FaceSource>;

/// State shared between the tracker handle and its polling task
struct Shared {
    status: watch::Sender<PresenceStatus>,
    events: broadcast::Sender<PresenceEvent>,
    running: AtomicBool,
}

/// A polling task and the means to stop it
struct PollLoop {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Option<BoxedSource>>,
}

struct Inner {
    config: TrackerConfig,
    /// Present whenever no polling task holds the source
    source: Option<BoxedSource>,
    poll: Option<PollLoop>,
}

/// Debounced presence tracker over a face-count source
pub struct PresenceTracker {
    inner: Mutex<Inner>,
    shared: Arc<Shared>,
}

impl PresenceTracker {
    /// Create a stopped tracker
    pub fn new(source: impl FaceSource, config: TrackerConfig) -> Self {
        let source: BoxedSource = Box::new(source);
        let (status, _) = watch::channel(PresenceStatus::idle(source.name()));
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);

        Self {
            inner: Mutex::new(Inner {
                config,
                source: Some(source),
                poll: None,
            }),
            shared: Arc::new(Shared {
                status,
                events,
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Change tracker timing
    ///
    /// Takes effect on the next `start()`.
    ///
    /// # Errors
    ///
    /// Returns error if any duration is zero
    pub async fn configure(
        &self,
        poll_interval: Duration,
        present_delay: Duration,
        absent_delay: Duration,
    ) -> Result<()> {
        let config = TrackerConfig::new(poll_interval, present_delay, absent_delay)?;
        self.inner.lock().await.config = config;
        tracing::debug!(?config, "tracker reconfigured");
        Ok(())
    }

    /// Current timing
    pub async fn config(&self) -> TrackerConfig {
        self.inner.lock().await.config
    }

    /// Acquire the source and begin polling
    ///
    /// Does nothing if already running.
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot be acquired. Polling does not
    /// start and nothing is retried.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(poll) = &inner.poll {
            if !poll.task.is_finished() {
                tracing::debug!("presence tracker already running");
                return Ok(());
            }
            // The previous loop ended on its own; take back whatever it returned
            if let Some(PollLoop { task, .. }) = inner.poll.take() {
                inner.source = reap(task).await;
            }
        }

        let source = inner
            .source
            .take()
            .ok_or_else(|| Error::SourceUnavailable("source lost by a previous run".to_string()))?;
        let name = source.name();

        let (source, acquired) = run_blocking(source, |s| s.acquire())
            .await
            .ok_or_else(|| Error::SourceUnavailable(format!("{name}: acquire panicked")))?;

        if let Err(e) = acquired {
            let e = match e {
                Error::SourceUnavailable(_) => e,
                other => Error::SourceUnavailable(other.to_string()),
            };
            tracing::error!(source = %name, error = %e, "failed to acquire face source");
            inner.source = Some(source);
            return Err(e);
        }

        let config = inner.config;
        self.shared.status.send_replace(PresenceStatus::idle(name.clone()));
        self.shared.running.store(true, Ordering::SeqCst);

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(poll_loop(
            source,
            config,
            shutdown_rx,
            Arc::clone(&self.shared),
        ));
        inner.poll = Some(PollLoop { shutdown, task });

        tracing::info!(
            source = %name,
            poll_interval = ?config.poll_interval,
            present_delay = ?config.present_delay,
            absent_delay = ?config.absent_delay,
            "presence tracker started"
        );
        Ok(())
    }

    /// Stop polling, release the source and reset presence
    ///
    /// An in-flight capture is cancelled if the source supports it, and
    /// awaited before the source is released.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        let Some(PollLoop { shutdown, task }) = inner.poll.take() else {
            return;
        };

        let _ = shutdown.send(());
        inner.source = reap(task).await;

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.status.send_modify(|status| {
            status.present = false;
            status.face_count = 0;
            status.error = None;
        });

        tracing::info!("presence tracker stopped");
    }

    /// Whether the polling task is alive
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Current debounced presence
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.shared.status.borrow().present
    }

    /// Snapshot of the status surface
    #[must_use]
    pub fn status(&self) -> PresenceStatus {
        self.shared.status.borrow().clone()
    }

    /// Observe every status update
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<PresenceStatus> {
        self.shared.status.subscribe()
    }

    /// Subscribe to session and presence events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.shared.events.subscribe()
    }
}

/// Wait for a polling task and recover its source
async fn reap(task: JoinHandle<Option<BoxedSource>>) -> Option<BoxedSource> {
    match task.await {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(error = %e, "presence polling task failed");
            None
        }
    }
}

/// Run `f` against the source on the blocking pool, handing the source back
///
/// Panics inside `f` are caught and turned into a capture error so the
/// source survives a faulty classifier.
fn spawn_source_call<T, F>(source: BoxedSource, f: F) -> JoinHandle<(BoxedSource, Result<T>)>
where
    T: Send + 'static,
    F: FnOnce(&mut BoxedSource) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut source = source;
        let result = panic::catch_unwind(AssertUnwindSafe(|| f(&mut source)))
            .unwrap_or_else(|payload| Err(Error::Capture(panic_message(payload.as_ref()))));
        (source, result)
    })
}

/// Await a [`spawn_source_call`], returning `None` if the task could not be joined
async fn run_blocking<T, F>(source: BoxedSource, f: F) -> Option<(BoxedSource, Result<T>)>
where
    T: Send + 'static,
    F: FnOnce(&mut BoxedSource) -> Result<T> + Send + 'static,
{
    match spawn_source_call(source, f).await {
        Ok(pair) => Some(pair),
        Err(e) => {
            tracing::error!(error = %e, "blocking source call failed");
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("detector panicked: {detail}")
}

/// Background polling loop
///
/// Returns the released source, or `None` if it was lost.
async fn poll_loop(
    mut source: BoxedSource,
    config: TrackerConfig,
    mut shutdown: oneshot::Receiver<()>,
    shared: Arc<Shared>,
) -> Option<BoxedSource> {
    let mut state = PresenceState::new(config);
    let cancel = source.cancel_token();
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let sampled_at = Instant::now();
        let mut capture = spawn_source_call(source, |s| s.capture_and_count());

        // On shutdown, cancel the capture and still wait for it so the
        // source is back in hand before release
        let (stopping, joined) = tokio::select! {
            biased;
            _ = &mut shutdown => {
                if let Some(cancel) = &cancel {
                    cancel.cancel();
                }
                (true, (&mut capture).await)
            }
            joined = &mut capture => (false, joined),
        };

        let result = match joined {
            Ok((returned, result)) => {
                source = returned;
                result
            }
            Err(e) => {
                tracing::error!(error = %e, "capture task failed, face source lost");
                shared.running.store(false, Ordering::SeqCst);
                shared.status.send_modify(|status| {
                    status.error = Some(format!("face source lost: {e}"));
                    status.last_update = Some(Utc::now());
                });
                return None;
            }
        };

        if stopping {
            tracing::debug!("stop requested during capture");
            break;
        }

        apply_tick(&mut state, sampled_at, result, &shared);
    }

    let released = run_blocking(source, |s| {
        s.release();
        Ok(())
    })
    .await;

    shared.running.store(false, Ordering::SeqCst);

    match released {
        Some((source, _)) => {
            tracing::debug!(source = %source.name(), "face source released");
            Some(source)
        }
        None => None,
    }
}

/// Fold one tick's result into the state, status and event stream
fn apply_tick(
    state: &mut PresenceState,
    sampled_at: Instant,
    result: Result<usize>,
    shared: &Shared,
) {
    match result {
        Ok(face_count) => {
            let events = state.on_tick(sampled_at, face_count);
            let present = state.is_present();

            shared.status.send_modify(|status| {
                status.present = present;
                status.face_count = face_count;
                status.error = None;
                status.last_update = Some(Utc::now());
            });

            // Status first, so subscribers reacting to an event see it reflected
            for event in events {
                tracing::debug!(?event, "presence event");
                let _ = shared.events.send(event);
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "detection tick failed");
            shared.status.send_modify(|status| {
                status.error = Some(e.to_string());
                status.last_update = Some(Utc::now());
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ScriptStep, ScriptedSource};

    fn fast_config(present_ms: u64, absent_ms: u64) -> TrackerConfig {
        TrackerConfig::new(
            Duration::from_millis(10),
            Duration::from_millis(present_ms),
            Duration::from_millis(absent_ms),
        )
        .unwrap()
    }

    async fn next_session_event(rx: &mut broadcast::Receiver<PresenceEvent>) -> PresenceEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                if event.is_session_transition() {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for session event")
    }

    #[tokio::test]
    async fn sustained_faces_start_a_session() {
        let source = ScriptedSource::from_counts(&[1]).looping();
        let tracker = PresenceTracker::new(source, fast_config(30, 30));
        let mut rx = tracker.subscribe();

        tracker.start().await.unwrap();
        assert_eq!(next_session_event(&mut rx).await, PresenceEvent::SessionStart);
        assert!(tracker.is_present());

        tracker.stop().await;
        assert!(!tracker.is_present());
        assert!(!tracker.is_running());
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let source = ScriptedSource::from_counts(&[0]).looping();
        let tracker = PresenceTracker::new(source, fast_config(30, 30));

        tracker.start().await.unwrap();
        tracker.start().await.unwrap();
        assert!(tracker.is_running());

        tracker.stop().await;
        tracker.stop().await;
        assert!(!tracker.is_running());
    }

    #[tokio::test]
    async fn acquire_failure_is_reported() {
        let tracker = PresenceTracker::new(ScriptedSource::new(Vec::new()), fast_config(30, 30));

        let err = tracker.start().await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
        assert!(!tracker.is_running());
    }

    #[tokio::test]
    async fn faulty_tick_is_recorded_in_status() {
        let source =
            ScriptedSource::new(vec![ScriptStep::Fault("camera unplugged".to_string())]).looping();
        let tracker = PresenceTracker::new(source, fast_config(30, 30));
        let mut status = tracker.watch_status();

        tracker.start().await.unwrap();
        let status = tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.error.is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();

        assert_eq!(status.error.as_deref(), Some("capture failed: camera unplugged"));
        assert!(status.last_update.is_some());
        assert!(tracker.is_running());

        tracker.stop().await;
        assert!(tracker.status().error.is_none());
    }

    #[tokio::test]
    async fn can_restart_after_stop() {
        let source = ScriptedSource::from_counts(&[1]).looping();
        let tracker = PresenceTracker::new(source, fast_config(20, 20));

        tracker.start().await.unwrap();
        tracker.stop().await;

        let mut rx = tracker.subscribe();
        tracker.start().await.unwrap();
        assert_eq!(next_session_event(&mut rx).await, PresenceEvent::SessionStart);
        tracker.stop().await;
    }

    #[tokio::test]
    async fn configure_rejects_zero() {
        let source = ScriptedSource::from_counts(&[0]);
        let tracker = PresenceTracker::new(source, TrackerConfig::default());

        assert!(
            tracker
                .configure(Duration::ZERO, Duration::from_secs(1), Duration::from_secs(1))
                .await
                .is_err()
        );
        assert_eq!(tracker.config().await, TrackerConfig::default());

        tracker
            .configure(
                Duration::from_millis(50),
                Duration::from_secs(2),
                Duration::from_secs(3),
            )
            .await
            .unwrap();
        assert_eq!(tracker.config().await.poll_interval, Duration::from_millis(50));
    }
}
