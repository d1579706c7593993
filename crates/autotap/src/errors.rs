use thiserror::Error;

/// Errors raised while scanning the accessibility tree or dispatching gestures.
///
/// None of these end a search session. A tick that hits one of them is skipped
/// and the scheduler carries on; only an explicit stop ends the session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutomationError {
    /// No foreground window could be read (permission revoked, no active window).
    #[error("Accessibility tree unavailable: {0}")]
    Unavailable(String),

    /// Tap coordinates resolved to a degenerate point.
    #[error("Invalid tap point ({x}, {y}): coordinates must be positive")]
    InvalidPoint { x: f64, y: f64 },

    #[error("Gesture dispatch cancelled: {0}")]
    DispatchCancelled(String),

    /// A node attribute could not be read. Contained by the tree walker.
    #[error("Failed to read node attribute: {0}")]
    AttributeRead(String),

    #[error("Platform error: {0}")]
    PlatformError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
