//! Ranked fallback resolution of semantic UI targets.

pub mod resolver;
pub mod result;
pub mod spec;

pub use resolver::{Collected, LocatorResolver};
pub use result::{DescriptorAttempt, Resolved, ResolutionError, ResolutionFailure};
pub use spec::{Disambiguation, LocatorSpec, SemanticTarget};
