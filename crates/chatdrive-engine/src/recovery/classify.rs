use crate::error::EngineError;
use chatdrive_common::error::ViewError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Failure family that decides whether and how an operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    TransientNetwork,
    StaleTarget,
    RateLimited,
    SessionInvalid,
    Timeout,
    Fatal,
}

/// Corrective step taken before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    None,
    /// Retry immediately; the next attempt resolves targets from scratch.
    ReResolve,
    Refresh,
    Reconnect,
    Reauthenticate,
    CoolOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    pub remediation: Remediation,
}

impl Classification {
    const fn new(category: ErrorCategory, remediation: Remediation) -> Self {
        Self {
            category,
            remediation,
        }
    }

    const FATAL: Classification = Classification::new(ErrorCategory::Fatal, Remediation::None);
}

lazy_static! {
    static ref RATE_LIMIT: Regex =
        Regex::new(r"(?i)rate.?limit|too many requests|usage cap|\b429\b|reached .*limit")
            .unwrap();
    static ref SESSION: Regex = Regex::new(
        r"(?i)unauthori[sz]ed|\b401\b|log ?in|sign ?in|session (has )?expired|not authenticated"
    )
    .unwrap();
    static ref STALE: Regex =
        Regex::new(r"(?i)element not found|no such element|stale|detached").unwrap();
    static ref TIMEOUT: Regex = Regex::new(r"(?i)time ?out|timed out").unwrap();
    static ref UNREACHABLE: Regex =
        Regex::new(r"(?i)target (closed|lost)|browser.*closed|crash|disconnected|connection closed")
            .unwrap();
    static ref NETWORK: Regex =
        Regex::new(r"(?i)network|connection|dns|socket|err_internet|unreachable").unwrap();
}

/// Classify a raw driver or page message by keyword.
pub fn classify_message(message: &str) -> Option<Classification> {
    if RATE_LIMIT.is_match(message) {
        Some(Classification::new(
            ErrorCategory::RateLimited,
            Remediation::CoolOff,
        ))
    } else if SESSION.is_match(message) {
        Some(Classification::new(
            ErrorCategory::SessionInvalid,
            Remediation::Reauthenticate,
        ))
    } else if STALE.is_match(message) {
        Some(Classification::new(
            ErrorCategory::StaleTarget,
            Remediation::ReResolve,
        ))
    } else if UNREACHABLE.is_match(message) {
        Some(Classification::new(
            ErrorCategory::TransientNetwork,
            Remediation::Reconnect,
        ))
    } else if TIMEOUT.is_match(message) {
        Some(Classification::new(
            ErrorCategory::Timeout,
            Remediation::Refresh,
        ))
    } else if NETWORK.is_match(message) {
        Some(Classification::new(
            ErrorCategory::TransientNetwork,
            Remediation::Refresh,
        ))
    } else {
        None
    }
}

/// Turn error-affordance text observed on the page into a typed error.
pub fn error_from_page_text(text: &str) -> EngineError {
    match classify_message(text).map(|c| c.category) {
        Some(ErrorCategory::RateLimited) => EngineError::RateLimited(text.to_string()),
        Some(ErrorCategory::SessionInvalid) => EngineError::SessionInvalid(text.to_string()),
        _ => EngineError::Errored(text.to_string()),
    }
}

pub fn classify(err: &EngineError) -> Classification {
    use ErrorCategory as C;
    use Remediation as R;

    match err {
        EngineError::Resolution(_) => Classification::new(C::StaleTarget, R::Refresh),
        EngineError::AmbiguousMatch { .. } => Classification::FATAL,
        EngineError::ActionNotConfirmed { .. } => Classification::new(C::StaleTarget, R::ReResolve),
        EngineError::StalledGeneration { .. } => Classification::new(C::Timeout, R::Refresh),
        EngineError::Errored(_) => Classification::new(C::TransientNetwork, R::Refresh),
        EngineError::Unreachable(_) => Classification::new(C::TransientNetwork, R::Reconnect),
        EngineError::RateLimited(_) => Classification::new(C::RateLimited, R::CoolOff),
        EngineError::SessionInvalid(_) => Classification::new(C::SessionInvalid, R::Reauthenticate),
        EngineError::CeilingExceeded { .. } => Classification::new(C::Timeout, R::None),
        EngineError::Cancelled | EngineError::InvalidInput(_) => Classification::FATAL,
        EngineError::View(view) => classify_view(view),
    }
}

fn classify_view(err: &ViewError) -> Classification {
    use ErrorCategory as C;
    use Remediation as R;

    if err.is_stale() {
        return Classification::new(C::StaleTarget, R::ReResolve);
    }
    match err {
        ViewError::ElementNotInteractable { .. } => {
            Classification::new(C::StaleTarget, R::ReResolve)
        }
        ViewError::Navigation(_) => Classification::new(C::TransientNetwork, R::Refresh),
        ViewError::ConnectionLost | ViewError::NotReady => {
            Classification::new(C::TransientNetwork, R::Reconnect)
        }
        ViewError::Timeout { .. } => Classification::new(C::Timeout, R::Refresh),
        ViewError::ScriptError(msg) | ViewError::Other(msg) => {
            classify_message(msg).unwrap_or(Classification::FATAL)
        }
        _ => Classification::FATAL,
    }
}
