use thiserror::Error;

/// Errors raised by a document view (the live page surface).
#[derive(Error, Debug, Clone)]
pub enum ViewError {
    #[error("Navigation failed: {0}")]
    Navigation(String),

    // Element errors, aligned with the probe's error codes
    #[error("Element {id} not found")]
    ElementNotFound { id: u32 },

    #[error("Element {id} is stale (removed from DOM)")]
    ElementStale { id: u32 },

    #[error("Element {id} is not interactable: {reason}")]
    ElementNotInteractable { id: u32, reason: String },

    #[error("Invalid selector: {selector}")]
    SelectorInvalid { selector: String },

    // Execution errors
    #[error("Script execution error: {0}")]
    ScriptError(String),

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    // Protocol errors
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // System errors
    #[error("Connection lost")]
    ConnectionLost,

    #[error("Not ready")]
    NotReady,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Other: {0}")]
    Other(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl From<std::io::Error> for ViewError {
    fn from(err: std::io::Error) -> Self {
        ViewError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ViewError {
    fn from(err: serde_json::Error) -> Self {
        ViewError::Serialization(err.to_string())
    }
}

impl ViewError {
    /// Stable error code, shared with the page probe.
    pub fn code(&self) -> &'static str {
        match self {
            ViewError::Navigation(_) => "NAVIGATION_ERROR",
            ViewError::ElementNotFound { .. } => "ELEMENT_NOT_FOUND",
            ViewError::ElementStale { .. } => "ELEMENT_STALE",
            ViewError::ElementNotInteractable { .. } => "ELEMENT_NOT_INTERACTABLE",
            ViewError::SelectorInvalid { .. } => "SELECTOR_INVALID",
            ViewError::ScriptError(_) => "SCRIPT_ERROR",
            ViewError::Timeout { .. } => "TIMEOUT",
            ViewError::UnknownCommand(_) => "UNKNOWN_COMMAND",
            ViewError::InvalidRequest(_) => "INVALID_REQUEST",
            ViewError::ConnectionLost => "CONNECTION_LOST",
            ViewError::NotReady => "NOT_READY",
            ViewError::Io(_) => "IO_ERROR",
            ViewError::Serialization(_) => "SERIALIZATION_ERROR",
            ViewError::Other(_) => "INTERNAL_ERROR",
            ViewError::NotSupported(_) => "NOT_SUPPORTED",
        }
    }

    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ViewError::ElementNotFound { .. } | ViewError::ElementStale { .. } => {
                "Re-resolve the target; the page re-rendered"
            }
            ViewError::ElementNotInteractable { .. } => "Wait for the element to become enabled",
            ViewError::Timeout { .. } => "Increase timeout or verify condition",
            ViewError::SelectorInvalid { .. } => "Fix descriptor syntax",
            ViewError::Navigation(_) => "Check URL and network connectivity",
            ViewError::ConnectionLost | ViewError::NotReady => {
                "Reconnect to the browser or relaunch it"
            }
            _ => "Check command parameters",
        }
    }

    /// A failure of the page or the connection rather than of the request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ViewError::ScriptError(_)
                | ViewError::Timeout { .. }
                | ViewError::ConnectionLost
                | ViewError::NotReady
                | ViewError::Io(_)
        )
    }

    /// The node behind an element id went away.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            ViewError::ElementStale { .. } | ViewError::ElementNotFound { .. }
        )
    }
}
