//! Host accessibility boundary
//!
//! The host platform owns the live UI tree. This module describes what the
//! engine needs from it: a snapshot of the foreground window's root node, a
//! per-node attribute reader, and a gesture-submission primitive. Every node
//! handed out by the host is wrapped in a [`NodeHandle`], which releases the
//! underlying host resource exactly once when it is dropped.

use crate::AutomationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::time::Duration;
use tokio::sync::oneshot;

pub mod snapshot;

/// A point in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates strictly positive (NaN counts as not positive).
    pub fn is_positive(&self) -> bool {
        self.x > 0.0 && self.y > 0.0
    }
}

/// Screen rectangle of a node, as (left, top, right, bottom).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Bounds {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Get the center point of this rectangle
    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }
}

/// Read-only view of one node in the host's UI tree.
///
/// Attribute reads can fail at any time: the tree is live and the node may
/// have been detached since it was fetched.
pub trait UiNode: Send {
    fn text(&self) -> Result<Option<String>, AutomationError>;

    fn description(&self) -> Result<Option<String>, AutomationError>;

    /// Host-assigned identifier (resource name, automation id).
    fn element_id(&self) -> Result<Option<String>, AutomationError>;

    /// Whether the node accepts taps.
    fn is_interactable(&self) -> Result<bool, AutomationError>;

    fn bounds(&self) -> Result<Bounds, AutomationError>;

    fn child_count(&self) -> Result<usize, AutomationError>;

    /// Fetch the child at `index`. Each call yields a fresh handle.
    fn child(&self, index: usize) -> Result<Option<NodeHandle>, AutomationError>;

    /// Fetch the parent node. Each call yields a fresh handle.
    fn parent(&self) -> Result<Option<NodeHandle>, AutomationError>;

    /// Give the host resource back. Called once, by [`NodeHandle`]'s `Drop`.
    fn release(&mut self);
}

/// Owning handle to a host node.
///
/// Dropping the handle releases the node, so a released node can never be
/// read again and every exit path (early return, `?`, panic unwinding)
/// releases exactly once.
pub struct NodeHandle {
    inner: Box<dyn UiNode>,
}

impl NodeHandle {
    pub fn new(node: impl UiNode + 'static) -> Self {
        Self {
            inner: Box::new(node),
        }
    }

    /// Short human-readable label used in logs.
    pub fn label(&self) -> String {
        let id = self.inner.element_id().ok().flatten();
        let text = self.inner.text().ok().flatten();
        match (id, text) {
            (Some(id), Some(text)) => format!("{id} \"{text}\""),
            (Some(id), None) => id,
            (None, Some(text)) => format!("\"{text}\""),
            (None, None) => "<unnamed>".to_string(),
        }
    }
}

impl Deref for NodeHandle {
    type Target = dyn UiNode;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeHandle").field(&self.label()).finish()
    }
}

/// One continuous touch stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeDescription {
    /// Points the touch passes through; a tap is a single point.
    pub path: Vec<Point>,
    /// Offset from gesture start at which the touch goes down.
    pub start_time: Duration,
    /// Time between touch-down and touch-up.
    pub duration: Duration,
}

/// A synthetic gesture to submit to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureDescription {
    pub strokes: Vec<StrokeDescription>,
}

impl GestureDescription {
    /// Touch-down/touch-up at `point`, held for `duration`.
    pub fn tap(point: Point, duration: Duration) -> Self {
        Self {
            strokes: vec![StrokeDescription {
                path: vec![point],
                start_time: Duration::ZERO,
                duration,
            }],
        }
    }
}

/// How the host finished a submitted gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GestureOutcome {
    Completed,
    Cancelled,
}

/// Kinds of UI-change notification a host may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UiEventKind {
    WindowContentChanged,
    WindowStateChanged,
    ViewClicked,
    ViewFocused,
    Other,
}

impl UiEventKind {
    /// Only content and window-state changes can reveal a new target.
    pub fn triggers_rescan(&self) -> bool {
        matches!(
            self,
            UiEventKind::WindowContentChanged | UiEventKind::WindowStateChanged
        )
    }
}

/// A UI-change notification from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiEvent {
    pub kind: UiEventKind,
    /// Application the event originated from, when the host reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl UiEvent {
    pub fn new(kind: UiEventKind) -> Self {
        Self { kind, source: None }
    }
}

/// The capabilities the engine consumes from the host platform.
pub trait AccessibilityEngine: Send + Sync {
    /// Snapshot the root node of the foreground window.
    ///
    /// Fails with [`AutomationError::Unavailable`] when no window is accessible.
    fn fetch_root(&self) -> Result<NodeHandle, AutomationError>;

    /// Submit a gesture. Submission is synchronous; the outcome arrives later
    /// on the returned receiver, possibly from another thread. A receiver whose
    /// sender is dropped means the host gave up on the gesture.
    fn dispatch_gesture(
        &self,
        gesture: GestureDescription,
    ) -> Result<oneshot::Receiver<GestureOutcome>, AutomationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_center() {
        let bounds = Bounds::new(100.0, 200.0, 300.0, 260.0);
        assert_eq!(bounds.center(), Point::new(200.0, 230.0));
        assert_eq!(bounds.width(), 200.0);
        assert_eq!(bounds.height(), 60.0);
    }

    #[test]
    fn test_point_positive() {
        assert!(Point::new(1.0, 1.0).is_positive());
        assert!(!Point::new(0.0, 5.0).is_positive());
        assert!(!Point::new(5.0, -1.0).is_positive());
        assert!(!Point::new(f64::NAN, 5.0).is_positive());
    }

    #[test]
    fn test_rescan_event_kinds() {
        assert!(UiEventKind::WindowContentChanged.triggers_rescan());
        assert!(UiEventKind::WindowStateChanged.triggers_rescan());
        assert!(!UiEventKind::ViewClicked.triggers_rescan());
        assert!(!UiEventKind::Other.triggers_rescan());
    }

    #[test]
    fn test_tap_gesture_shape() {
        let gesture = GestureDescription::tap(Point::new(10.0, 20.0), Duration::from_millis(100));
        assert_eq!(gesture.strokes.len(), 1);
        let stroke = &gesture.strokes[0];
        assert_eq!(stroke.path, vec![Point::new(10.0, 20.0)]);
        assert_eq!(stroke.start_time, Duration::ZERO);
        assert_eq!(stroke.duration, Duration::from_millis(100));
    }
}
