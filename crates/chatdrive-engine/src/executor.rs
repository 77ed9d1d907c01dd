use crate::config::ExecutorConfig;
use crate::error::EngineError;
use crate::locator::{LocatorResolver, LocatorSpec, ResolutionError, Resolved, SemanticTarget};
use crate::view::DocumentView;
use async_recursion::async_recursion;
use chatdrive_common::protocol::{Descriptor, Element};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One primitive UI interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click,
    SetText(String),
    Upload(PathBuf),
    PressKey(String),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::SetText(_) => "set_text",
            Action::Upload(_) => "upload",
            Action::PressKey(_) => "press_key",
        }
    }

    /// Post-condition checked when the caller does not declare one.
    pub fn default_expect(&self) -> Expect {
        match self {
            Action::Click | Action::PressKey(_) => Expect::TargetChanged,
            Action::SetText(text) => Expect::ValueEquals(text.clone()),
            Action::Upload(_) => Expect::FilesAttached,
        }
    }
}

/// Observable post-condition confirming that an action took effect.
#[derive(Debug, Clone, PartialEq)]
pub enum Expect {
    Appears(LocatorSpec),
    Disappears(LocatorSpec),
    /// The acted-on element changed state or was detached.
    TargetChanged,
    /// The acted-on element's value equals the text, whitespace-normalized.
    ValueEquals(String),
    FilesAttached,
    Any(Vec<Expect>),
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Appears(spec) => write!(f, "'{}' to appear", spec.target),
            Expect::Disappears(spec) => write!(f, "'{}' to disappear", spec.target),
            Expect::TargetChanged => write!(f, "target to change"),
            Expect::ValueEquals(_) => write!(f, "value to match the entered text"),
            Expect::FilesAttached => write!(f, "a file to be attached"),
            Expect::Any(all) => {
                let parts: Vec<String> = all.iter().map(|e| e.to_string()).collect();
                write!(f, "any of [{}]", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum ActionResult {
    Succeeded { resolved: Resolved, elapsed: Duration },
    Failed(EngineError),
    Ambiguous {
        target: SemanticTarget,
        descriptor: Descriptor,
        candidates: usize,
    },
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Succeeded { .. })
    }

    pub fn into_result(self) -> Result<Resolved, EngineError> {
        match self {
            ActionResult::Succeeded { resolved, .. } => Ok(resolved),
            ActionResult::Failed(err) => Err(err),
            ActionResult::Ambiguous {
                target,
                descriptor,
                candidates,
            } => Err(EngineError::AmbiguousMatch {
                target,
                descriptor,
                candidates,
            }),
        }
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve, act once, then confirm. Never retries.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    resolver: LocatorResolver,
    settle_window: Duration,
    settle_poll: Duration,
}

impl ActionExecutor {
    pub fn new(resolver: LocatorResolver, config: &ExecutorConfig, scale: f64) -> Self {
        Self {
            resolver,
            settle_window: config.settle_window(scale),
            settle_poll: config.settle_poll(scale),
        }
    }

    pub fn resolver(&self) -> &LocatorResolver {
        &self.resolver
    }

    pub async fn execute(
        &self,
        view: &mut dyn DocumentView,
        spec: &LocatorSpec,
        action: &Action,
        expect: Option<&Expect>,
        cancel: &CancellationToken,
    ) -> ActionResult {
        let start = Instant::now();

        if let Action::Upload(path) = action
            && !path.is_file()
        {
            return ActionResult::Failed(EngineError::InvalidInput(format!(
                "file not found: {}",
                path.display()
            )));
        }

        let resolved = match self.resolver.resolve(view, spec, cancel).await {
            Ok(resolved) => resolved,
            Err(ResolutionError::Ambiguous {
                target,
                descriptor,
                candidates,
            }) => {
                warn!(target_name = %target, %descriptor, candidates, "Ambiguous target");
                return ActionResult::Ambiguous {
                    target,
                    descriptor,
                    candidates,
                };
            }
            Err(err) => return ActionResult::Failed(err.into()),
        };

        let id = resolved.element.id;
        debug!(
            action = action.name(),
            target_name = %spec.target,
            id,
            descriptor = %resolved.descriptor,
            "Performing action"
        );

        let performed = match action {
            Action::Click => view.click(id).await,
            Action::SetText(text) => view.set_text(id, text).await,
            Action::Upload(path) => view.upload(id, path).await,
            Action::PressKey(key) => view.press_key(id, key).await,
        };
        if let Err(err) = performed {
            return ActionResult::Failed(err.into());
        }

        let default_expect;
        let expect = match expect {
            Some(expect) => expect,
            None => {
                default_expect = action.default_expect();
                &default_expect
            }
        };

        match self.settle(view, expect, &resolved.element, cancel).await {
            Ok(true) => {
                let elapsed = start.elapsed();
                info!(
                    action = action.name(),
                    target_name = %spec.target,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Action confirmed"
                );
                ActionResult::Succeeded { resolved, elapsed }
            }
            Ok(false) => ActionResult::Failed(EngineError::ActionNotConfirmed {
                target: spec.target.clone(),
                action: action.name().to_string(),
                detail: format!(
                    "expected {} within {}ms",
                    expect,
                    self.settle_window.as_millis()
                ),
            }),
            Err(err) => ActionResult::Failed(err),
        }
    }

    /// Poll the post-condition until it holds or the settle window closes.
    async fn settle(
        &self,
        view: &mut dyn DocumentView,
        expect: &Expect,
        before: &Element,
        cancel: &CancellationToken,
    ) -> Result<bool, EngineError> {
        let deadline = Instant::now().checked_add(self.settle_window);
        loop {
            if self.check(view, expect, before).await? {
                return Ok(true);
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                return Ok(false);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(self.settle_poll.min(remaining)) => {}
            }
        }
    }

    #[async_recursion]
    async fn check(
        &self,
        view: &mut dyn DocumentView,
        expect: &Expect,
        before: &Element,
    ) -> Result<bool, EngineError> {
        match expect {
            Expect::Appears(spec) => Ok(self
                .resolver
                .collect(view, spec)
                .await?
                .is_some_and(|c| c.elements.iter().any(|e| e.visible))),
            Expect::Disappears(spec) => Ok(!self
                .resolver
                .collect(view, spec)
                .await?
                .is_some_and(|c| c.elements.iter().any(|e| e.visible))),
            Expect::TargetChanged => match Self::inspect(view, before.id).await? {
                Some(now) => Ok(!now.same_state(before)),
                None => Ok(true),
            },
            Expect::ValueEquals(text) => Ok(Self::inspect(view, before.id)
                .await?
                .is_some_and(|el| {
                    normalize_whitespace(el.current_value()) == normalize_whitespace(text)
                })),
            Expect::FilesAttached => Ok(Self::inspect(view, before.id)
                .await?
                .is_some_and(|el| el.file_count > 0)),
            Expect::Any(all) => {
                for inner in all {
                    if self.check(view, inner, before).await? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Inspect, treating a stale id as a detached element.
    async fn inspect(view: &mut dyn DocumentView, id: u32) -> Result<Option<Element>, EngineError> {
        match view.inspect(id).await {
            Ok(el) => Ok(el),
            Err(err) if err.is_stale() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
