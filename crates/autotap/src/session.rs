//! Search session controller
//!
//! The controller is what the presentation shell talks to. It owns the target
//! text and the session status, and drives the scheduler. The host constructs
//! one controller and hands it to the shell; there is no global instance.

use crate::config::AutoTapConfig;
use crate::gesture::GestureDispatcher;
use crate::matcher::SearchTarget;
use crate::platforms::{AccessibilityEngine, GestureOutcome, UiEvent};
use crate::scheduler::{ScanScheduler, ScanTick, SchedulerState, UiEventSink};
use crate::walker::TreeWalker;
use crate::AutomationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Running totals since the controller was created. Never reset by stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanCounters {
    pub ticks: u64,
    pub skipped_unavailable: u64,
    pub not_found: u64,
    pub matches: u64,
    pub invalid_points: u64,
    pub taps_completed: u64,
    pub taps_cancelled: u64,
}

/// What the presentation shell can observe.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    pub last_match_at: Option<DateTime<Utc>>,
    pub target: String,
    pub counters: ScanCounters,
}

/// State shared between the controller and the ticks it schedules.
struct SessionCore {
    engine: Arc<dyn AccessibilityEngine>,
    walker: TreeWalker,
    dispatcher: GestureDispatcher,
    target: RwLock<String>,
    status: watch::Sender<SessionStatus>,
}

impl SessionCore {
    fn count(&self, bump: impl FnOnce(&mut ScanCounters)) {
        self.status.send_modify(|status| bump(&mut status.counters));
    }
}

#[async_trait]
impl ScanTick for SessionCore {
    async fn tick(&self, cancel: CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        // One snapshot per tick; later set_target calls apply to later ticks.
        let target = SearchTarget::new(self.target.read().clone());
        self.count(|c| c.ticks += 1);
        if target.is_empty() {
            debug!("No target set, skipping scan");
            return;
        }

        let engine = Arc::clone(&self.engine);
        let walker = self.walker.clone();
        let scan_target = target.clone();
        let scan = tokio::task::spawn_blocking(move || walker.scan(engine.as_ref(), &scan_target))
            .await
            .map_err(|e| AutomationError::PlatformError(format!("Task join error: {e}")))
            .and_then(|result| result);

        let hit = match scan {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                debug!("'{}' not found this tick", target.as_str());
                self.count(|c| c.not_found += 1);
                return;
            }
            Err(AutomationError::Unavailable(reason)) => {
                debug!("Skipping tick: {}", reason);
                self.count(|c| c.skipped_unavailable += 1);
                return;
            }
            Err(e) => {
                warn!("Scan failed: {}", e);
                return;
            }
        };

        if cancel.is_cancelled() {
            debug!("Session stopped during scan, dropping match {}", hit.label);
            return;
        }
        self.count(|c| c.matches += 1);
        info!(
            "Found '{}' at {} ({}, {})",
            target.as_str(),
            hit.label,
            hit.point.x,
            hit.point.y
        );

        let outcome = self.dispatcher.tap(hit.point).await;
        if cancel.is_cancelled() {
            debug!("Session stopped while tap was in flight, not recording it");
            return;
        }
        match outcome {
            Ok(GestureOutcome::Completed) => {
                let now = Utc::now();
                self.status.send_modify(|status| {
                    status.last_match_at = Some(now);
                    status.counters.taps_completed += 1;
                });
            }
            Ok(GestureOutcome::Cancelled) => self.count(|c| c.taps_cancelled += 1),
            Err(AutomationError::InvalidPoint { .. }) => self.count(|c| c.invalid_points += 1),
            Err(e) => {
                warn!("Tap dispatch failed: {}", e);
                self.count(|c| c.taps_cancelled += 1);
            }
        }
    }
}

/// Public state machine: Idle ⇄ Searching.
pub struct SessionController {
    core: Arc<SessionCore>,
    scheduler: ScanScheduler,
    /// Serialises start/stop so the scheduler sees them in status order.
    transition: Mutex<()>,
    /// Set once the scheduler loop has been told to exit.
    shut_down: AtomicBool,
}

impl SessionController {
    /// Build a controller and spawn its scheduler on the current tokio runtime.
    pub fn new(
        engine: Arc<dyn AccessibilityEngine>,
        config: AutoTapConfig,
    ) -> Result<Self, AutomationError> {
        config.validate()?;
        let dispatcher = GestureDispatcher::new(Arc::clone(&engine))
            .with_tap_duration(config.tap_duration())
            .with_timeout(config.gesture_timeout());
        let (status, _) = watch::channel(SessionStatus::default());
        let core = Arc::new(SessionCore {
            engine,
            walker: TreeWalker::new(config.max_depth),
            dispatcher,
            target: RwLock::new(String::new()),
            status,
        });
        let scheduler = ScanScheduler::spawn(core.clone(), config.timing())?;
        debug!("Session controller ready with {:?}", config);
        Ok(Self {
            core,
            scheduler,
            transition: Mutex::new(()),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Replace the target. Takes effect from the next tick.
    pub fn set_target(&self, text: impl Into<String>) {
        let text = text.into();
        *self.core.target.write() = text.clone();
        self.core.status.send_modify(|status| status.target = text);
    }

    pub fn target(&self) -> String {
        self.core.target.read().clone()
    }

    /// Start searching. Returns false if a session was already active or the
    /// controller has been shut down.
    #[instrument(skip(self))]
    pub fn start(&self) -> bool {
        let _guard = self.transition.lock();
        if self.shut_down.load(Ordering::SeqCst) {
            warn!("Ignoring start: session controller is shut down");
            return false;
        }
        let started = self.core.status.send_if_modified(|status| {
            if status.active {
                false
            } else {
                status.active = true;
                true
            }
        });
        if started {
            self.scheduler.start();
            info!("Search started for '{}'", self.target());
        }
        started
    }

    /// Stop searching. Returns false if no session was active.
    #[instrument(skip(self))]
    pub fn stop(&self) -> bool {
        let _guard = self.transition.lock();
        let stopped = self.core.status.send_if_modified(|status| {
            if status.active {
                status.active = false;
                true
            } else {
                false
            }
        });
        if stopped {
            self.scheduler.stop();
            info!("Search stopped");
        }
        stopped
    }

    pub fn is_active(&self) -> bool {
        self.core.status.borrow().active
    }

    pub fn status(&self) -> SessionStatus {
        self.core.status.borrow().clone()
    }

    /// Watch status changes (activity, matches, counters).
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.core.status.subscribe()
    }

    /// Handle the host uses to report UI changes from its own thread.
    pub fn event_sink(&self) -> UiEventSink {
        self.scheduler.event_sink()
    }

    /// Report a UI change directly.
    pub fn notify_ui_event(&self, event: &UiEvent) {
        self.scheduler.event_sink().notify(event);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Stop the session and end the scheduler loop, e.g. when the host
    /// service is torn down. Waits for the loop to exit.
    pub async fn shutdown(&self) {
        {
            let _guard = self.transition.lock();
            self.shut_down.store(true, Ordering::SeqCst);
        }
        self.stop();
        self.scheduler.join().await;
        info!("Session controller shut down");
    }
}
