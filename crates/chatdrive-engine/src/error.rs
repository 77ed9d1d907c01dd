use crate::completion::CompletionState;
use crate::locator::{ResolutionError, ResolutionFailure, SemanticTarget};
use chatdrive_common::error::ViewError;
use chatdrive_common::protocol::Descriptor;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Resolution failed: {0}")]
    Resolution(ResolutionFailure),

    #[error("Ambiguous match for '{target}': {descriptor} matched {candidates} elements")]
    AmbiguousMatch {
        target: SemanticTarget,
        descriptor: Descriptor,
        candidates: usize,
    },

    #[error("{action} on '{target}' was not confirmed: {detail}")]
    ActionNotConfirmed {
        target: SemanticTarget,
        action: String,
        detail: String,
    },

    #[error("Generation stalled: no progress for {}s", .idle.as_secs())]
    StalledGeneration {
        idle: Duration,
        partial: Option<String>,
    },

    #[error("Page reported an error: {0}")]
    Errored(String),

    #[error("View unreachable: {0}")]
    Unreachable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    #[error("No terminal state within {}s (last state {state:?})", .ceiling.as_secs())]
    CeilingExceeded {
        ceiling: Duration,
        state: CompletionState,
        partial: Option<String>,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("View error: {0}")]
    View(ViewError),
}

impl From<ViewError> for EngineError {
    fn from(err: ViewError) -> Self {
        match err {
            ViewError::ConnectionLost | ViewError::NotReady => {
                EngineError::Unreachable(err.to_string())
            }
            other => EngineError::View(other),
        }
    }
}

impl From<ResolutionError> for EngineError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::NotFound(failure) => EngineError::Resolution(failure),
            ResolutionError::Ambiguous {
                target,
                descriptor,
                candidates,
            } => EngineError::AmbiguousMatch {
                target,
                descriptor,
                candidates,
            },
            ResolutionError::Cancelled => EngineError::Cancelled,
            ResolutionError::View(view) => view.into(),
        }
    }
}

impl EngineError {
    /// Short operator-facing advice for log lines.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self {
            EngineError::View(view) => Some(view.recovery_hint()),
            EngineError::Unreachable(_) => Some(ViewError::ConnectionLost.recovery_hint()),
            EngineError::Resolution(_) | EngineError::ActionNotConfirmed { .. } => {
                Some(ViewError::ElementStale { id: 0 }.recovery_hint())
            }
            EngineError::AmbiguousMatch { .. } => Some("Add a disambiguation policy to the target"),
            EngineError::RateLimited(_) => Some("Wait for the usage limit to reset"),
            EngineError::SessionInvalid(_) => Some("Log in again with the browser profile"),
            EngineError::StalledGeneration { .. } | EngineError::CeilingExceeded { .. } => {
                Some("Raise the operation class or ceiling")
            }
            _ => None,
        }
    }

    /// Content captured before the wait gave up, if any.
    pub fn partial(&self) -> Option<&str> {
        match self {
            EngineError::StalledGeneration { partial, .. }
            | EngineError::CeilingExceeded { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_follow_the_view_error() {
        let stale = EngineError::from(ViewError::ElementStale { id: 3 });
        assert_eq!(
            stale.recovery_hint(),
            Some(ViewError::ElementStale { id: 3 }.recovery_hint())
        );
        let lost = EngineError::from(ViewError::ConnectionLost);
        assert!(matches!(lost, EngineError::Unreachable(_)));
        assert!(lost.recovery_hint().is_some_and(|h| h.contains("Reconnect")));
        assert_eq!(EngineError::Cancelled.recovery_hint(), None);
    }
}
