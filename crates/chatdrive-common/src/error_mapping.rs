//! Probe error mapping
//!
//! Maps error codes reported by the injected page probe to `ViewError` variants.

use crate::error::ViewError;
use serde_json::Value;

/// Maps a probe error code and message to a ViewError.
///
/// Unknown codes fall back to `ViewError::Other` with the code kept in the message.
pub fn map_probe_error(code: &str, message: &str, details: Option<&Value>) -> ViewError {
    match code {
        "ELEMENT_NOT_FOUND" => ViewError::ElementNotFound {
            id: extract_id(details),
        },
        "ELEMENT_STALE" => ViewError::ElementStale {
            id: extract_id(details),
        },
        "ELEMENT_NOT_VISIBLE" | "ELEMENT_DISABLED" | "ELEMENT_NOT_INTERACTABLE" => {
            ViewError::ElementNotInteractable {
                id: extract_id(details),
                reason: message.to_string(),
            }
        }
        "SELECTOR_INVALID" => {
            let selector = details
                .and_then(|d| d.get("selector"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            ViewError::SelectorInvalid { selector }
        }
        "SCRIPT_ERROR" => ViewError::ScriptError(message.to_string()),
        "TIMEOUT" => ViewError::Timeout {
            operation: message.to_string(),
        },
        "NAVIGATION_ERROR" => ViewError::Navigation(message.to_string()),
        "UNKNOWN_COMMAND" | "UNKNOWN_ACTION" => ViewError::UnknownCommand(message.to_string()),
        "INVALID_REQUEST" | "INVALID_PARAMS" => ViewError::InvalidRequest(message.to_string()),
        "INTERNAL_ERROR" => ViewError::Other(message.to_string()),
        _ => ViewError::Other(format!("[{}] {}", code, message)),
    }
}

fn extract_id(details: Option<&Value>) -> u32 {
    details
        .and_then(|d| d.get("id"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_element_stale() {
        let details = json!({"id": 5});
        let err = map_probe_error("ELEMENT_STALE", "Element removed from DOM", Some(&details));
        assert!(matches!(err, ViewError::ElementStale { id: 5 }));
        assert_eq!(err.code(), "ELEMENT_STALE");
    }

    #[test]
    fn test_map_disabled_to_not_interactable() {
        let details = json!({"id": 3});
        let err = map_probe_error("ELEMENT_DISABLED", "Send button is disabled", Some(&details));
        match err {
            ViewError::ElementNotInteractable { id, reason } => {
                assert_eq!(id, 3);
                assert_eq!(reason, "Send button is disabled");
            }
            _ => panic!("Expected ElementNotInteractable"),
        }
    }

    #[test]
    fn test_map_selector_invalid() {
        let details = json!({"selector": "button:has-text(\"Send\")"});
        let err = map_probe_error("SELECTOR_INVALID", "Unsupported selector", Some(&details));
        match err {
            ViewError::SelectorInvalid { selector } => {
                assert_eq!(selector, "button:has-text(\"Send\")");
            }
            _ => panic!("Expected SelectorInvalid"),
        }
    }

    #[test]
    fn test_map_missing_details() {
        let err = map_probe_error("ELEMENT_NOT_FOUND", "gone", None);
        assert!(matches!(err, ViewError::ElementNotFound { id: 0 }));
    }

    #[test]
    fn test_map_unknown_code() {
        let err = map_probe_error("WEIRD", "something odd", None);
        match err {
            ViewError::Other(msg) => assert_eq!(msg, "[WEIRD] something odd"),
            _ => panic!("Expected Other"),
        }
    }
}
