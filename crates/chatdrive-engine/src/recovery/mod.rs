//! Bounded retry with error classification and remediation.

pub mod classify;
pub mod coordinator;
pub mod policy;

pub use classify::{
    Classification, ErrorCategory, Remediation, classify, classify_message, error_from_page_text,
};
pub use coordinator::{
    Operation, OperationOutcome, OutcomeStatus, RecoveryCoordinator, SessionProvider,
};
pub use policy::RetryPolicy;
