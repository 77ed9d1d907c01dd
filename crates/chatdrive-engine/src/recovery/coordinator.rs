use super::classify::{ErrorCategory, Remediation, classify};
use super::policy::RetryPolicy;
use crate::error::EngineError;
use crate::view::DocumentView;
use async_trait::async_trait;
use chatdrive_common::error::ViewError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A unit of work the coordinator may run several times.
///
/// Each call to `run` must start from scratch: resolve targets again and
/// carry nothing over from a failed attempt.
#[async_trait]
pub trait Operation: Send + Sync {
    type Output: Send;

    fn name(&self) -> &str;

    async fn run(
        &self,
        view: &mut dyn DocumentView,
        cancel: &CancellationToken,
    ) -> Result<Self::Output, EngineError>;
}

/// Hook supplied by whoever owns the browser session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Bring the session back (reconnect, re-login) after `cause`.
    async fn reestablish(
        &self,
        view: &mut dyn DocumentView,
        cause: &EngineError,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    /// Ran out of attempts; the condition may still clear on its own.
    Exhausted,
    /// Definitely failed; retrying would not help.
    Fatal,
    Cancelled,
}

#[derive(Debug)]
pub struct OperationOutcome<T> {
    pub status: OutcomeStatus,
    pub attempts: u32,
    pub value: Option<T>,
    pub last_error: Option<EngineError>,
}

impl<T> OperationOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn into_result(self) -> Result<T, EngineError> {
        match (self.value, self.last_error) {
            (Some(value), _) => Ok(value),
            (None, Some(err)) => Err(err),
            (None, None) => Err(EngineError::Cancelled),
        }
    }

    fn failed(status: OutcomeStatus, attempts: u32, err: EngineError) -> Self {
        Self {
            status,
            attempts,
            value: None,
            last_error: Some(err),
        }
    }
}

/// Runs operations under bounded retry with category-specific remediation.
#[derive(Clone)]
pub struct RecoveryCoordinator {
    policy: Arc<RetryPolicy>,
    session: Option<Arc<dyn SessionProvider>>,
}

impl RecoveryCoordinator {
    pub fn new(policy: Arc<RetryPolicy>) -> Self {
        Self {
            policy,
            session: None,
        }
    }

    pub fn with_session_provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(provider);
        self
    }

    pub fn with_policy(mut self, policy: Arc<RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run<O: Operation + ?Sized>(
        &self,
        view: &mut dyn DocumentView,
        op: &O,
        cancel: &CancellationToken,
    ) -> OperationOutcome<O::Output> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return OperationOutcome::failed(
                    OutcomeStatus::Cancelled,
                    attempt,
                    EngineError::Cancelled,
                );
            }

            attempt += 1;
            debug!(op = op.name(), attempt, max_attempts, "Running operation");

            let err = match op.run(view, cancel).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(op = op.name(), attempt, "Operation succeeded after retry");
                    }
                    return OperationOutcome {
                        status: OutcomeStatus::Success,
                        attempts: attempt,
                        value: Some(value),
                        last_error: None,
                    };
                }
                Err(err) => err,
            };

            if matches!(err, EngineError::Cancelled) {
                return OperationOutcome::failed(OutcomeStatus::Cancelled, attempt, err);
            }

            let class = classify(&err);
            if class.category == ErrorCategory::Fatal {
                warn!(
                    op = op.name(),
                    attempt,
                    error = %err,
                    hint = err.recovery_hint().unwrap_or_default(),
                    "Fatal error, not retrying"
                );
                return OperationOutcome::failed(OutcomeStatus::Fatal, attempt, err);
            }
            if !self.policy.is_retryable(class.category) {
                warn!(
                    op = op.name(),
                    attempt,
                    category = ?class.category,
                    error = %err,
                    "Error category is not retryable"
                );
                return OperationOutcome::failed(OutcomeStatus::Exhausted, attempt, err);
            }
            if attempt >= max_attempts {
                warn!(
                    op = op.name(),
                    attempt,
                    error = %err,
                    hint = err.recovery_hint().unwrap_or_default(),
                    "Retry attempts exhausted"
                );
                return OperationOutcome::failed(OutcomeStatus::Exhausted, attempt, err);
            }

            warn!(
                op = op.name(),
                attempt,
                category = ?class.category,
                remediation = ?class.remediation,
                error = %err,
                hint = err.recovery_hint().unwrap_or_default(),
                "Attempt failed, recovering"
            );

            let delay = self.policy.backoff(attempt, class.category);
            if !self.pause(delay, cancel).await {
                return OperationOutcome::failed(OutcomeStatus::Cancelled, attempt, err);
            }

            if let Err(remedy_err) = self.remediate(view, class.remediation, &err).await {
                if class.category == ErrorCategory::SessionInvalid {
                    warn!(error = %remedy_err, "Session could not be re-established");
                    return OperationOutcome::failed(OutcomeStatus::Exhausted, attempt, err);
                }
                warn!(remediation = ?class.remediation, error = %remedy_err, "Remediation failed");
            }
        }
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        debug!(delay_ms = delay.as_millis() as u64, "Backing off");
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn remediate(
        &self,
        view: &mut dyn DocumentView,
        remediation: Remediation,
        cause: &EngineError,
    ) -> Result<(), EngineError> {
        match remediation {
            // Backoff already covered the cool-off; re-resolution happens on the next run.
            Remediation::None | Remediation::ReResolve | Remediation::CoolOff => Ok(()),
            Remediation::Refresh => {
                info!("Reloading page");
                view.reload().await.map_err(EngineError::from)
            }
            Remediation::Reconnect => match view.reconnect().await {
                Ok(()) => {
                    info!("Reconnected to view");
                    Ok(())
                }
                Err(err) => {
                    debug!(error = %err, "View could not reconnect itself");
                    match &self.session {
                        Some(provider) => provider.reestablish(view, cause).await,
                        None => Err(err.into()),
                    }
                }
            },
            Remediation::Reauthenticate => match &self.session {
                Some(provider) => {
                    info!("Re-establishing session");
                    provider.reestablish(view, cause).await
                }
                None => Err(EngineError::View(ViewError::NotSupported(
                    "no session provider to re-establish the session".into(),
                ))),
            },
        }
    }
}
