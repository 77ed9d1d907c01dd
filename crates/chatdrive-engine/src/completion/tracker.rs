use super::schedule::PollSchedule;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Pending,
    Streaming,
    Stalled,
    Complete,
    Errored,
}

/// One poll's worth of evidence read from the page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// A stop button or streaming indicator is visible.
    pub indicator: bool,
    /// Text of the latest assistant message.
    pub content: Option<String>,
    /// Number of assistant messages on the page.
    pub turns: usize,
    /// Text of the latest visible error affordance.
    pub error: Option<String>,
    /// Number of visible error affordances.
    pub errors: usize,
}

/// What the conversation looked like before the prompt was submitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baseline {
    pub turns: usize,
    pub text: Option<String>,
    /// Error affordances already showing. Only new ones end a wait.
    pub errors: usize,
    pub error: Option<String>,
    /// Texts that do not count as an answer until a generation has been seen.
    pub settled: Vec<String>,
}

impl Baseline {
    /// Baseline for rewriting an earlier turn. The page may drop later turns,
    /// so every message already there is settled and the turn count alone
    /// proves nothing.
    pub fn rewriting(mut self, texts: Vec<String>) -> Self {
        self.text = None;
        self.settled = texts;
        self
    }

    fn is_fresh(&self, obs: &Observation, saw_indicator: bool) -> bool {
        let Some(content) = obs.content.as_deref() else {
            return false;
        };
        if content.trim().is_empty() {
            return false;
        }
        if !saw_indicator && self.settled.iter().any(|t| t == content) {
            return false;
        }
        obs.turns > self.turns || self.text.as_deref() != Some(content)
    }

    /// True when the observed error was not already on the page. A banner that
    /// went away is forgotten, so the same text coming back counts as new.
    fn new_error<'a>(&mut self, obs: &'a Observation) -> Option<&'a str> {
        if obs.errors < self.errors {
            self.errors = obs.errors;
        }
        if obs.errors == 0 {
            self.error = None;
        }
        let error = obs.error.as_deref()?;
        if obs.errors > self.errors || self.error.as_deref() != Some(error) {
            Some(error)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrackerSettings {
    pub cooldown: Duration,
    pub stall_grace: Duration,
    pub stall_rechecks: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Complete(String),
    Errored(String),
    Stalled {
        idle: Duration,
        content: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue(CompletionState),
    Done(Verdict),
}

/// Pure completion state machine. Time is supplied by the caller, so the same
/// observation sequence always produces the same steps.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    settings: TrackerSettings,
    baseline: Baseline,
    state: CompletionState,
    last_content: Option<String>,
    last_progress: Option<Instant>,
    settle_since: Option<Instant>,
    streaming_polls: u32,
    stall_checks: u32,
    saw_indicator: bool,
}

impl CompletionTracker {
    pub fn new(settings: TrackerSettings, baseline: Baseline) -> Self {
        Self {
            settings,
            baseline,
            state: CompletionState::Pending,
            last_content: None,
            last_progress: None,
            settle_since: None,
            streaming_polls: 0,
            stall_checks: 0,
            saw_indicator: false,
        }
    }

    pub fn state(&self) -> CompletionState {
        self.state
    }

    /// Latest content seen, fresh or not.
    pub fn last_content(&self) -> Option<&str> {
        self.last_content.as_deref()
    }

    pub fn is_settling(&self) -> bool {
        self.settle_since.is_some()
    }

    pub fn observe(&mut self, now: Instant, obs: &Observation) -> Step {
        let last_progress = *self.last_progress.get_or_insert(now);

        if let Some(error) = self.baseline.new_error(obs) {
            self.state = CompletionState::Errored;
            self.settle_since = None;
            return Step::Done(Verdict::Errored(error.to_string()));
        }

        let grew = obs.content.is_some() && obs.content != self.last_content;
        if grew {
            self.last_content = obs.content.clone();
            self.last_progress = Some(now);
            self.stall_checks = 0;
        }

        if obs.indicator {
            self.saw_indicator = true;
            self.settle_since = None;
            return self.observe_indicator(now, grew, last_progress);
        }

        if !self.baseline.is_fresh(obs, self.saw_indicator) {
            self.settle_since = None;
            return Step::Continue(self.state);
        }

        if self.state != CompletionState::Streaming {
            self.state = CompletionState::Streaming;
        }

        match self.settle_since {
            Some(since) if !grew => {
                if now.duration_since(since) >= self.settings.cooldown {
                    self.state = CompletionState::Complete;
                    self.settle_since = None;
                    let content = self.last_content.clone().unwrap_or_default();
                    return Step::Done(Verdict::Complete(content));
                }
            }
            _ => self.settle_since = Some(now),
        }
        Step::Continue(self.state)
    }

    fn observe_indicator(&mut self, now: Instant, grew: bool, last_progress: Instant) -> Step {
        match self.state {
            CompletionState::Stalled if grew => {
                self.state = CompletionState::Streaming;
                self.streaming_polls += 1;
            }
            CompletionState::Stalled => {
                self.stall_checks += 1;
                if self.stall_checks >= self.settings.stall_rechecks {
                    return Step::Done(Verdict::Stalled {
                        idle: now.duration_since(last_progress),
                        content: self.last_content.clone(),
                    });
                }
            }
            _ => {
                self.state = CompletionState::Streaming;
                self.streaming_polls += 1;
                let idle = if grew {
                    Duration::ZERO
                } else {
                    now.duration_since(last_progress)
                };
                if idle >= self.settings.stall_grace {
                    self.state = CompletionState::Stalled;
                    self.stall_checks = 0;
                }
            }
        }
        Step::Continue(self.state)
    }

    /// How long to wait before the next observation.
    pub fn next_delay(&self, now: Instant, schedule: &PollSchedule) -> Duration {
        if let Some(since) = self.settle_since {
            return self
                .settings
                .cooldown
                .saturating_sub(now.duration_since(since));
        }
        match self.state {
            CompletionState::Stalled => {
                schedule.stall_recheck(self.stall_checks, self.settings.stall_grace)
            }
            CompletionState::Streaming => schedule.streaming(self.streaming_polls.max(1)),
            _ => schedule.initial,
        }
    }
}
