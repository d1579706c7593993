//! Find-and-tap automation over accessibility trees
//!
//! Give the engine a piece of text and it keeps scanning the foreground
//! window's accessibility tree for a node whose text, description or
//! identifier contains it, then taps that node (or its nearest interactable
//! ancestor). Scans run on a fixed delay while a session is active and are
//! pulled forward, debounced, when the host reports that the UI changed.
//!
//! The host platform plugs in through [`AccessibilityEngine`]; the
//! presentation shell drives a [`SessionController`].
//!
//! ```ignore
//! let engine = Arc::new(SnapshotEngine::from_json(&tree_json)?);
//! let controller = SessionController::new(engine, AutoTapConfig::default())?;
//! controller.set_target("OK");
//! controller.start();
//!
//! // Hand this to the host's event thread.
//! let sink = controller.event_sink();
//! sink.notify(&UiEvent::new(UiEventKind::WindowContentChanged));
//! ```

pub mod config;
pub mod errors;
pub mod gesture;
pub mod matcher;
pub mod platforms;
pub mod scheduler;
pub mod session;
pub mod walker;

pub use config::AutoTapConfig;
pub use errors::AutomationError;
pub use gesture::GestureDispatcher;
pub use matcher::{matches, MatchFields, SearchTarget};
pub use platforms::snapshot::{GestureMode, SnapshotEngine, UINode};
pub use platforms::{
    AccessibilityEngine, Bounds, GestureDescription, GestureOutcome, NodeHandle, Point, UiEvent,
    UiEventKind, UiNode,
};
pub use scheduler::{ScanScheduler, ScanTick, SchedulerState, SchedulerTiming, UiEventSink};
pub use session::{ScanCounters, SessionController, SessionStatus};
pub use tokio_util::sync::CancellationToken;
pub use walker::{find_actionable, ScanHit, TreeWalker, WalkResult, WalkStats};
