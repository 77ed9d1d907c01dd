use chatdrive_engine::error_mapping::map_probe_error;
use chatdrive_engine::protocol::{ProbeAction, ProbeResponse};
use chatdrive_engine::view::ViewError;
use chromiumoxide::Page;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use std::time::Duration;

const PROBE_JS: &str = include_str!("probe.js");

/// Default timeout for JavaScript evaluation.
/// Keeps a dialog blocking the JS thread from hanging the caller.
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum retries for context errors during page navigation.
const MAX_CONTEXT_RETRIES: u32 = 10;

/// Delay between retries when context is not found (page navigating).
const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Check if an error indicates the page context is unavailable (e.g., during navigation).
fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

/// Check if an error means the DevTools connection itself is gone.
fn is_disconnect_error(err: &str) -> bool {
    let lower = err.to_ascii_lowercase();
    lower.contains("channel")
        || lower.contains("websocket")
        || lower.contains("connection closed")
        || lower.contains("target closed")
        || lower.contains("session closed")
        || lower.contains("no response")
}

fn classify_eval_error(err: String) -> EvalError {
    if is_context_error(&err) {
        EvalError::Context(err)
    } else if is_disconnect_error(&err) {
        EvalError::Disconnected
    } else {
        EvalError::Other(err)
    }
}

enum EvalError {
    Timeout,
    Context(String),
    Disconnected,
    Other(String),
}

impl EvalError {
    fn into_view_error(self, operation: &str) -> ViewError {
        match self {
            EvalError::Timeout => ViewError::Timeout {
                operation: format!("{} (possibly blocked by a dialog)", operation),
            },
            EvalError::Context(_) => ViewError::NotReady,
            EvalError::Disconnected => ViewError::ConnectionLost,
            EvalError::Other(msg) => ViewError::ScriptError(msg),
        }
    }
}

async fn evaluate_with_timeout(
    page: &Page,
    expression: &str,
) -> Result<serde_json::Value, EvalError> {
    match tokio::time::timeout(EVAL_TIMEOUT, page.evaluate(expression)).await {
        Err(_) => Err(EvalError::Timeout),
        Ok(Err(e)) => Err(classify_eval_error(e.to_string())),
        Ok(Ok(remote_object)) => remote_object
            .into_value::<serde_json::Value>()
            .map_err(|e| EvalError::Other(format!("Failed to get result: {}", e))),
    }
}

/// Retry while the page is between documents. Anything else returns at once.
async fn evaluate_retrying(
    page: &Page,
    operation: &str,
    expression: &str,
) -> Result<serde_json::Value, ViewError> {
    for attempt in 0..MAX_CONTEXT_RETRIES {
        match evaluate_with_timeout(page, expression).await {
            Ok(value) => return Ok(value),
            Err(EvalError::Context(err)) => {
                tracing::debug!(
                    "{} context error (attempt {}/{}): {}",
                    operation,
                    attempt + 1,
                    MAX_CONTEXT_RETRIES,
                    err
                );
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
            Err(other) => return Err(other.into_view_error(operation)),
        }
    }
    Err(ViewError::NotReady)
}

/// Install the probe unless this document already has it.
pub async fn ensure_probe(page: &Page) -> Result<(), ViewError> {
    let loaded = evaluate_retrying(
        page,
        "Probe check",
        "typeof window.__chatdrive !== 'undefined'",
    )
    .await?;
    if loaded.as_bool() != Some(true) {
        tracing::debug!("Injecting page probe");
        evaluate_retrying(page, "Probe injection", PROBE_JS).await?;
    }
    Ok(())
}

/// Run one probe action and unwrap its reply.
pub async fn run_probe(page: &Page, action: &ProbeAction) -> Result<serde_json::Value, ViewError> {
    let params_json = serde_json::to_string(action)?;
    let expression = format!("window.__chatdrive.process({})", params_json);

    tracing::trace!("Evaluating probe: {}", expression);

    // A navigation between the check and the call drops the probe; inject again.
    for attempt in 0..MAX_CONTEXT_RETRIES {
        ensure_probe(page).await?;
        match evaluate_with_timeout(page, &expression).await {
            Ok(value) => return unwrap_reply(value),
            Err(EvalError::Context(_)) => {
                tracing::debug!(
                    "Context error during probe (attempt {}/{}), retrying...",
                    attempt + 1,
                    MAX_CONTEXT_RETRIES
                );
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
            Err(EvalError::Other(err)) if err.contains("__chatdrive") => {
                tracing::debug!("Probe vanished mid-call, reinjecting");
            }
            Err(other) => return Err(other.into_view_error("probe")),
        }
    }
    Err(ViewError::NotReady)
}

fn unwrap_reply(value: serde_json::Value) -> Result<serde_json::Value, ViewError> {
    match serde_json::from_value::<ProbeResponse>(value)? {
        ProbeResponse::Ok { data } => Ok(data),
        ProbeResponse::Error {
            code,
            message,
            details,
        } => Err(map_probe_error(&code, &message, details.as_ref())),
    }
}

/// Remote object id of a probe-tracked element, for CDP calls that need a node.
pub async fn node_object_id(page: &Page, id: u32) -> Result<String, ViewError> {
    ensure_probe(page).await?;
    let params = EvaluateParams::builder()
        .expression(format!("window.__chatdrive.node({})", id))
        .return_by_value(false)
        .build()
        .map_err(ViewError::InvalidRequest)?;
    let reply = tokio::time::timeout(EVAL_TIMEOUT, page.execute(params))
        .await
        .map_err(|_| ViewError::Timeout {
            operation: "node lookup".into(),
        })?
        .map_err(|e| classify_eval_error(e.to_string()).into_view_error("node lookup"))?;

    if let Some(exception) = &reply.result.exception_details {
        return Err(ViewError::ScriptError(exception.text.clone()));
    }
    reply
        .result
        .result
        .object_id
        .clone()
        .map(|object_id| object_id.inner().clone())
        .ok_or(ViewError::ElementStale { id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_classes() {
        assert!(is_context_error("Execution context was destroyed."));
        assert!(is_disconnect_error("send failed because receiver is gone: channel closed"));
        assert!(!is_disconnect_error("TypeError: x is undefined"));
        assert!(matches!(
            classify_eval_error("ReferenceError: foo".into()).into_view_error("probe"),
            ViewError::ScriptError(_)
        ));
    }

    #[test]
    fn test_unwrap_reply() {
        let data = unwrap_reply(json!({"status": "ok", "data": [1, 2]})).unwrap();
        assert_eq!(data, json!([1, 2]));

        let err = unwrap_reply(json!({
            "status": "error",
            "code": "ELEMENT_STALE",
            "message": "Element 9 was removed",
            "details": {"id": 9}
        }))
        .unwrap_err();
        assert!(matches!(err, ViewError::ElementStale { id: 9 }));
    }

    #[test]
    fn test_probe_script_defines_entry_points() {
        assert!(PROBE_JS.contains("window.__chatdrive"));
        assert!(PROBE_JS.contains("process"));
        assert!(PROBE_JS.contains("node"));
    }
}
