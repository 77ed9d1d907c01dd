use super::schedule::PollSchedule;
use super::tracker::{
    Baseline, CompletionState, CompletionTracker, Observation, Step, TrackerSettings, Verdict,
};
use crate::config::CompletionConfig;
use crate::error::EngineError;
use crate::locator::{LocatorResolver, LocatorSpec};
use crate::recovery::error_from_page_text;
use crate::targets::{
    ASSISTANT_MESSAGE, ERROR_AFFORDANCE, STOP_BUTTON, STREAMING_INDICATOR, TargetCatalog,
};
use crate::timeouts::format_duration;
use crate::view::DocumentView;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Limits for one wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitBudget {
    /// Hard upper bound for the whole wait.
    pub ceiling: Duration,
    /// How long the indicator may stay up without content growth before stalling.
    pub stall_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct CompletionReport {
    pub state: CompletionState,
    /// Final content exactly as last observed.
    pub content: String,
    pub polls: u32,
    pub elapsed: Duration,
}

/// Async driver around `CompletionTracker` that reads observations from a view.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    resolver: LocatorResolver,
    schedule: PollSchedule,
    cooldown: Duration,
    stall_rechecks: u32,
    error_tolerance: u32,
    stop: LocatorSpec,
    streaming: LocatorSpec,
    messages: LocatorSpec,
    error: LocatorSpec,
}

impl CompletionDetector {
    pub fn new(
        catalog: &TargetCatalog,
        config: &CompletionConfig,
        scale: f64,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            resolver: LocatorResolver::default(),
            schedule: PollSchedule::from_config(config, scale),
            cooldown: config.cooldown(scale),
            stall_rechecks: config.stall_rechecks,
            error_tolerance: config.observe_error_tolerance,
            stop: catalog.require(STOP_BUTTON)?.clone(),
            streaming: catalog.require(STREAMING_INDICATOR)?.clone(),
            messages: catalog.require(ASSISTANT_MESSAGE)?.clone(),
            error: catalog.require(ERROR_AFFORDANCE)?.clone(),
        })
    }

    pub fn schedule(&self) -> &PollSchedule {
        &self.schedule
    }

    /// Snapshot of the assistant messages and error banners before a prompt
    /// is submitted.
    pub async fn baseline<V: DocumentView + ?Sized>(
        &self,
        view: &mut V,
    ) -> Result<Baseline, EngineError> {
        let mut baseline = match self.resolver.collect(view, &self.messages).await? {
            Some(c) => Baseline {
                turns: c.elements.len(),
                text: c.elements.last().map(|e| e.text.clone()),
                ..Default::default()
            },
            None => Baseline::default(),
        };
        (baseline.errors, baseline.error) = self.errors(view).await?;
        Ok(baseline)
    }

    /// Baseline for an edit of an earlier message, where the answer replaces
    /// turns that are already on the page.
    pub async fn rewrite_baseline<V: DocumentView + ?Sized>(
        &self,
        view: &mut V,
    ) -> Result<Baseline, EngineError> {
        let texts = match self.resolver.collect(view, &self.messages).await? {
            Some(c) => c.elements.into_iter().map(|e| e.text).collect(),
            None => Vec::new(),
        };
        Ok(self.baseline(view).await?.rewriting(texts))
    }

    async fn errors<V: DocumentView + ?Sized>(
        &self,
        view: &mut V,
    ) -> Result<(usize, Option<String>), EngineError> {
        let collected = self.resolver.collect_checked(view, &self.error).await?;
        let visible: Vec<String> = match collected {
            Some(c) => c
                .elements
                .into_iter()
                .filter(|e| e.visible)
                .map(|e| e.text.trim().to_string())
                .collect(),
            None => Vec::new(),
        };
        let latest = visible.iter().rev().find(|t| !t.is_empty()).cloned();
        Ok((visible.len(), latest))
    }

    pub async fn observe<V: DocumentView + ?Sized>(
        &self,
        view: &mut V,
    ) -> Result<Observation, EngineError> {
        let mut indicator = false;
        for spec in [&self.stop, &self.streaming] {
            if let Some(c) = self.resolver.collect_checked(view, spec).await?
                && c.elements.iter().any(|e| e.visible)
            {
                indicator = true;
                break;
            }
        }

        let (content, turns) = match self.resolver.collect_checked(view, &self.messages).await? {
            Some(c) => (c.elements.last().map(|e| e.text.clone()), c.elements.len()),
            None => (None, 0),
        };

        let (errors, error) = self.errors(view).await?;

        Ok(Observation {
            indicator,
            content,
            turns,
            error,
            errors,
        })
    }

    /// Poll until the generation completes, fails, stalls or hits the ceiling.
    pub async fn wait<V: DocumentView + ?Sized>(
        &self,
        view: &mut V,
        baseline: Baseline,
        budget: WaitBudget,
        cancel: &CancellationToken,
    ) -> Result<CompletionReport, EngineError> {
        let start = Instant::now();
        // A ceiling too large to represent means no deadline.
        let deadline = start.checked_add(budget.ceiling);
        let settings = TrackerSettings {
            cooldown: self.cooldown,
            stall_grace: budget.stall_grace,
            stall_rechecks: self.stall_rechecks,
        };
        let mut tracker = CompletionTracker::new(settings, baseline);
        let mut polls = 0u32;
        let mut misses = 0u32;

        info!(ceiling = %format_duration(budget.ceiling), "Waiting for completion");

        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let observation = match self.observe(view).await {
                Ok(observation) => {
                    misses = 0;
                    observation
                }
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(err) => {
                    if !view.is_reachable().await {
                        return Err(match err {
                            EngineError::Unreachable(_) => err,
                            other => EngineError::Unreachable(other.to_string()),
                        });
                    }
                    misses += 1;
                    if misses > self.error_tolerance {
                        return Err(err);
                    }
                    warn!(misses, error = %err, "Completion poll failed, page still reachable");
                    let delay = match remaining(deadline) {
                        Some(left) if left.is_zero() => {
                            return Err(self.ceiling_exceeded(&tracker, budget));
                        }
                        Some(left) => self.schedule.initial.min(left),
                        None => self.schedule.initial,
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            };
            polls += 1;
            let now = Instant::now();

            match tracker.observe(now, &observation) {
                Step::Done(Verdict::Complete(content)) => {
                    let elapsed = now - start;
                    info!(polls, elapsed_ms = elapsed.as_millis() as u64, "Generation complete");
                    return Ok(CompletionReport {
                        state: CompletionState::Complete,
                        content,
                        polls,
                        elapsed,
                    });
                }
                Step::Done(Verdict::Errored(text)) => {
                    return Err(error_from_page_text(&text));
                }
                Step::Done(Verdict::Stalled { idle, content }) => {
                    return Err(EngineError::StalledGeneration {
                        idle,
                        partial: content,
                    });
                }
                Step::Continue(state) => {
                    debug!(
                        poll = polls,
                        ?state,
                        indicator = observation.indicator,
                        turns = observation.turns,
                        settling = tracker.is_settling(),
                        "Completion poll"
                    );
                }
            }

            let mut delay = tracker.next_delay(now, &self.schedule);
            if let Some(left) = remaining(deadline) {
                if left.is_zero() {
                    return Err(self.ceiling_exceeded(&tracker, budget));
                }
                delay = delay.min(left);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn ceiling_exceeded(&self, tracker: &CompletionTracker, budget: WaitBudget) -> EngineError {
        EngineError::CeilingExceeded {
            ceiling: budget.ceiling,
            state: tracker.state(),
            partial: tracker.last_content().map(str::to_string),
        }
    }
}

fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}
