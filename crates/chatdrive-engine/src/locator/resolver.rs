use super::result::{DescriptorAttempt, Resolved, ResolutionError, ResolutionFailure};
use super::spec::LocatorSpec;
use crate::config::ResolverConfig;
use crate::view::DocumentView;
use chatdrive_common::error::ViewError;
use chatdrive_common::protocol::{Descriptor, Element};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// All live matches of the first descriptor that matched anything.
#[derive(Debug, Clone)]
pub struct Collected {
    pub descriptor_index: usize,
    pub elements: Vec<Element>,
}

enum Pass {
    Resolved(Resolved),
    Missed {
        attempts: Vec<DescriptorAttempt>,
        ambiguous: Option<(Descriptor, usize)>,
    },
}

/// Resolves semantic targets against a live view through ranked fallback descriptors.
#[derive(Debug, Clone)]
pub struct LocatorResolver {
    pub budget: Duration,
    pub initial_poll: Duration,
    pub max_poll: Duration,
}

impl Default for LocatorResolver {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(10),
            initial_poll: Duration::from_millis(100),
            max_poll: Duration::from_secs(1),
        }
    }
}

impl LocatorResolver {
    pub fn from_config(config: &ResolverConfig, scale: f64) -> Self {
        Self {
            budget: config.budget(scale),
            initial_poll: config.initial_poll(scale),
            max_poll: config.max_poll(scale),
        }
    }

    /// Resolve with the configured budget.
    pub async fn resolve<V: DocumentView + ?Sized>(
        &self,
        view: &mut V,
        spec: &LocatorSpec,
        cancel: &CancellationToken,
    ) -> Result<Resolved, ResolutionError> {
        self.resolve_within(view, spec, self.budget, cancel).await
    }

    /// Single pass over the descriptor list, no waiting.
    pub async fn resolve_once<V: DocumentView + ?Sized>(
        &self,
        view: &mut V,
        spec: &LocatorSpec,
    ) -> Result<Resolved, ResolutionError> {
        self.resolve_within(view, spec, Duration::ZERO, &CancellationToken::new())
            .await
    }

    /// Retry the whole descriptor list until one resolves, `budget` expires or
    /// `cancel` fires.
    pub async fn resolve_within<V: DocumentView + ?Sized>(
        &self,
        view: &mut V,
        spec: &LocatorSpec,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<Resolved, ResolutionError> {
        let start = Instant::now();
        // An unrepresentable deadline means no deadline.
        let deadline = start.checked_add(budget);
        let mut delay = self.initial_poll;
        let mut passes = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(ResolutionError::Cancelled);
            }
            passes += 1;
            let (attempts, ambiguous) = match Self::pass(view, spec).await? {
                Pass::Resolved(resolved) => {
                    debug!(
                        target_name = %spec.target,
                        index = resolved.descriptor_index,
                        descriptor = %resolved.descriptor,
                        passes,
                        "Resolved target"
                    );
                    return Ok(resolved);
                }
                Pass::Missed {
                    attempts,
                    ambiguous,
                } => (attempts, ambiguous),
            };

            let now = Instant::now();
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(now),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                if let Some((descriptor, candidates)) = ambiguous {
                    return Err(ResolutionError::Ambiguous {
                        target: spec.target.clone(),
                        descriptor,
                        candidates,
                    });
                }
                let failure = ResolutionFailure {
                    target: spec.target.clone(),
                    attempts,
                    passes,
                    elapsed: now - start,
                };
                warn!("{}", failure);
                return Err(ResolutionError::NotFound(failure));
            }

            let loading = view.is_loading().await.unwrap_or(false);
            debug!(
                target_name = %spec.target,
                pass = passes,
                loading,
                "No descriptor resolved, polling again"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(ResolutionError::Cancelled),
                _ = tokio::time::sleep(delay.min(remaining)) => {}
            }
            delay = delay.saturating_mul(2).min(self.max_poll);
        }
    }

    /// Every live match of the first descriptor that matches anything.
    ///
    /// Used for targets that legitimately repeat (message turns). Query errors
    /// other than a lost connection are skipped like in `resolve`.
    pub async fn collect<V: DocumentView + ?Sized>(
        &self,
        view: &mut V,
        spec: &LocatorSpec,
    ) -> Result<Option<Collected>, ViewError> {
        for (index, descriptor) in spec.descriptors.iter().enumerate() {
            match view.query(descriptor).await {
                Ok(elements) if !elements.is_empty() => {
                    return Ok(Some(Collected {
                        descriptor_index: index,
                        elements,
                    }));
                }
                Ok(_) => {}
                Err(ViewError::ConnectionLost) => return Err(ViewError::ConnectionLost),
                Err(e) => debug!(descriptor = %descriptor, error = %e, "Skipping descriptor"),
            }
        }
        Ok(None)
    }

    /// Like `collect`, but a page-level failure with nothing matched is an
    /// error instead of an empty result. Rejected descriptors are still skipped.
    pub async fn collect_checked<V: DocumentView + ?Sized>(
        &self,
        view: &mut V,
        spec: &LocatorSpec,
    ) -> Result<Option<Collected>, ViewError> {
        let mut failure = None;
        for (index, descriptor) in spec.descriptors.iter().enumerate() {
            match view.query(descriptor).await {
                Ok(elements) if !elements.is_empty() => {
                    return Ok(Some(Collected {
                        descriptor_index: index,
                        elements,
                    }));
                }
                Ok(_) => {}
                Err(ViewError::ConnectionLost) => return Err(ViewError::ConnectionLost),
                Err(e) if e.is_transient() => {
                    failure.get_or_insert(e);
                }
                Err(e) => debug!(descriptor = %descriptor, error = %e, "Skipping descriptor"),
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn pass<V: DocumentView + ?Sized>(
        view: &mut V,
        spec: &LocatorSpec,
    ) -> Result<Pass, ResolutionError> {
        let mut attempts = Vec::with_capacity(spec.descriptors.len());
        let mut ambiguous = None;

        for (index, descriptor) in spec.descriptors.iter().enumerate() {
            let matches = match view.query(descriptor).await {
                Ok(matches) => matches,
                Err(ViewError::ConnectionLost) => {
                    return Err(ResolutionError::View(ViewError::ConnectionLost));
                }
                Err(e) => {
                    debug!(descriptor = %descriptor, error = %e, "Descriptor rejected");
                    attempts.push(DescriptorAttempt {
                        index,
                        descriptor: descriptor.clone(),
                        matches: 0,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            attempts.push(DescriptorAttempt {
                index,
                descriptor: descriptor.clone(),
                matches: matches.len(),
                error: None,
            });

            if matches.is_empty() {
                continue;
            }

            match spec.policy.pick(&matches) {
                Some(element) => {
                    return Ok(Pass::Resolved(Resolved {
                        target: spec.target.clone(),
                        descriptor_index: index,
                        descriptor: descriptor.clone(),
                        element: element.clone(),
                        candidates: matches.len(),
                    }));
                }
                None if spec.policy.is_positional() => {}
                None => {
                    if ambiguous.is_none() {
                        ambiguous = Some((descriptor.clone(), matches.len()));
                    }
                }
            }
        }

        Ok(Pass::Missed {
            attempts,
            ambiguous,
        })
    }
}
