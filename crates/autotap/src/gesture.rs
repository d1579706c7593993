//! Synthetic tap dispatch

use crate::platforms::{AccessibilityEngine, GestureDescription, GestureOutcome, Point};
use crate::AutomationError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default time between touch-down and touch-up.
pub const DEFAULT_TAP_DURATION: Duration = Duration::from_millis(100);

/// Default wait for the host to report a gesture's outcome.
pub const DEFAULT_GESTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns screen points into tap gestures and submits them to the host.
#[derive(Clone)]
pub struct GestureDispatcher {
    engine: Arc<dyn AccessibilityEngine>,
    tap_duration: Duration,
    timeout: Duration,
}

impl GestureDispatcher {
    pub fn new(engine: Arc<dyn AccessibilityEngine>) -> Self {
        Self {
            engine,
            tap_duration: DEFAULT_TAP_DURATION,
            timeout: DEFAULT_GESTURE_TIMEOUT,
        }
    }

    pub fn with_tap_duration(mut self, tap_duration: Duration) -> Self {
        self.tap_duration = tap_duration;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tap at `point` and wait for the host to finish the gesture.
    ///
    /// Points with a non-positive coordinate are rejected with
    /// [`AutomationError::InvalidPoint`] before anything is submitted. A host
    /// that drops the completion channel or does not answer within the timeout
    /// counts as [`GestureOutcome::Cancelled`]. Nothing is retried here.
    #[instrument(level = "debug", skip(self))]
    pub async fn tap(&self, point: Point) -> Result<GestureOutcome, AutomationError> {
        if !point.is_positive() {
            warn!("Refusing to tap at invalid point ({}, {})", point.x, point.y);
            return Err(AutomationError::InvalidPoint {
                x: point.x,
                y: point.y,
            });
        }

        let gesture = GestureDescription::tap(point, self.tap_duration);
        let completion = self.engine.dispatch_gesture(gesture)?;

        let outcome = match tokio::time::timeout(self.timeout, completion).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                debug!("Host dropped the gesture callback");
                GestureOutcome::Cancelled
            }
            Err(_) => {
                debug!("No gesture outcome after {:?}", self.timeout);
                GestureOutcome::Cancelled
            }
        };

        match outcome {
            GestureOutcome::Completed => info!("Tap completed at ({}, {})", point.x, point.y),
            GestureOutcome::Cancelled => warn!("Tap cancelled at ({}, {})", point.x, point.y),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::snapshot::{GestureMode, SnapshotEngine, UINode};

    fn dispatcher(engine: &SnapshotEngine) -> GestureDispatcher {
        GestureDispatcher::new(Arc::new(engine.clone()))
    }

    #[tokio::test]
    async fn test_rejects_non_positive_points_without_dispatch() {
        let engine = SnapshotEngine::new(UINode::new("root"));
        let dispatcher = dispatcher(&engine);

        for point in [
            Point::new(0.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(-5.0, 10.0),
            Point::new(10.0, -0.5),
        ] {
            let result = dispatcher.tap(point).await;
            assert!(
                matches!(result, Err(AutomationError::InvalidPoint { .. })),
                "expected rejection for {point:?}"
            );
        }
        assert!(engine.gestures().is_empty());
    }

    #[tokio::test]
    async fn test_completed_tap() {
        let engine = SnapshotEngine::new(UINode::new("root"));
        let dispatcher = dispatcher(&engine).with_tap_duration(Duration::from_millis(50));

        let outcome = dispatcher.tap(Point::new(540.0, 960.0)).await.unwrap();
        assert_eq!(outcome, GestureOutcome::Completed);

        let gestures = engine.gestures();
        assert_eq!(gestures.len(), 1);
        assert_eq!(
            gestures[0],
            GestureDescription::tap(Point::new(540.0, 960.0), Duration::from_millis(50))
        );
    }

    #[tokio::test]
    async fn test_cancelled_tap_is_not_an_error() {
        let engine = SnapshotEngine::new(UINode::new("root"));
        engine.set_gesture_mode(GestureMode::Cancel);

        let outcome = dispatcher(&engine).tap(Point::new(1.0, 1.0)).await.unwrap();
        assert_eq!(outcome, GestureOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_host_refusal_surfaces_as_error() {
        let engine = SnapshotEngine::new(UINode::new("root"));
        engine.set_gesture_mode(GestureMode::Reject);

        let result = dispatcher(&engine).tap(Point::new(1.0, 1.0)).await;
        assert!(matches!(result, Err(AutomationError::DispatchCancelled(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_gesture_times_out_as_cancelled() {
        let engine = SnapshotEngine::new(UINode::new("root"));
        engine.set_gesture_mode(GestureMode::Hold);
        let dispatcher = dispatcher(&engine).with_timeout(Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        let outcome = dispatcher.tap(Point::new(3.0, 4.0)).await.unwrap();
        assert_eq!(outcome, GestureOutcome::Cancelled);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
