use super::spec::SemanticTarget;
use chatdrive_common::error::ViewError;
use chatdrive_common::protocol::{Descriptor, Element};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A target bound to one live element.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub target: SemanticTarget,
    /// Position of the winning descriptor in the spec.
    pub descriptor_index: usize,
    pub descriptor: Descriptor,
    pub element: Element,
    /// Number of live matches the winning descriptor produced.
    pub candidates: usize,
}

/// Outcome of querying one descriptor during the last pass.
#[derive(Debug, Clone)]
pub struct DescriptorAttempt {
    pub index: usize,
    pub descriptor: Descriptor,
    pub matches: usize,
    pub error: Option<String>,
}

/// No descriptor produced a usable element within the budget.
#[derive(Debug, Clone)]
pub struct ResolutionFailure {
    pub target: SemanticTarget,
    pub attempts: Vec<DescriptorAttempt>,
    pub passes: u32,
    pub elapsed: Duration,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no descriptor matched '{}' after {} pass(es) in {}ms",
            self.target,
            self.passes,
            self.elapsed.as_millis()
        )?;
        for attempt in &self.attempts {
            match &attempt.error {
                Some(err) => write!(f, "; [{}] {}: {}", attempt.index, attempt.descriptor, err)?,
                None => write!(
                    f,
                    "; [{}] {}: {} match(es)",
                    attempt.index, attempt.descriptor, attempt.matches
                )?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionFailure {}

#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error("{0}")]
    NotFound(ResolutionFailure),

    #[error("'{target}' is ambiguous: {descriptor} matched {candidates} elements")]
    Ambiguous {
        target: SemanticTarget,
        descriptor: Descriptor,
        candidates: usize,
    },

    #[error("resolution cancelled")]
    Cancelled,

    #[error(transparent)]
    View(#[from] ViewError),
}
