//! A single conversation surface driven through the engine.
//!
//! Every public operation takes the view lock for its whole duration, so a
//! prompt can never be submitted while another wait is still pending.

pub mod history;
pub mod model;
pub mod ops;

pub use history::{ConversationEntry, ConversationRef};
pub use ops::{Answer, SubmitReceipt};

use crate::completion::{Baseline, CompletionDetector, CompletionReport, WaitBudget};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::executor::{Action, ActionExecutor, ActionResult, Expect};
use crate::locator::{LocatorResolver, Resolved};
use crate::recovery::{
    Operation, OperationOutcome, RecoveryCoordinator, RetryPolicy, SessionProvider,
};
use crate::targets::{
    ASSISTANT_MESSAGE, CONVERSATION_TURN, LOGIN_INDICATOR, MESSAGE_INPUT, TargetCatalog,
};
use crate::timeouts::OperationClass;
use crate::view::DocumentView;
use history::SwitchConversationOp;
use model::SelectModelOp;
use ops::{AskOp, AttachFileOp, EditMessageOp, NewChatOp, RegenerateOp, SubmitOp};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Role label lines the UI prints above message text.
const ROLE_LABELS: &[&str] = &[
    "ChatGPT",
    "ChatGPT said:",
    "You",
    "You said:",
    "GPT-4",
    "o1",
    "o3",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Ready,
    LoginRequired,
    Unknown,
}

/// Drop a leading role label line and surrounding whitespace.
pub fn strip_role_label(text: &str) -> String {
    let trimmed = text.trim();
    let mut lines = trimmed.lines();
    match lines.next() {
        Some(first) if ROLE_LABELS.contains(&first.trim()) => {
            lines.collect::<Vec<_>>().join("\n").trim().to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// Engine components shared by every operation of a session.
pub(crate) struct Parts {
    pub config: EngineConfig,
    pub catalog: TargetCatalog,
    pub executor: ActionExecutor,
    pub detector: CompletionDetector,
}

struct Inner {
    view: Box<dyn DocumentView>,
    baseline: Option<Baseline>,
}

pub struct Session {
    parts: Parts,
    coordinator: RecoveryCoordinator,
    inner: Mutex<Inner>,
}

impl Session {
    pub fn new(view: Box<dyn DocumentView>, config: EngineConfig) -> Result<Self, EngineError> {
        let scale = config.scale();
        let catalog = TargetCatalog::builtin().with_overrides(&config.targets);
        let resolver = LocatorResolver::from_config(&config.resolver, scale);
        let executor = ActionExecutor::new(resolver, &config.executor, scale);
        let detector = CompletionDetector::new(&catalog, &config.completion, scale)?;
        let policy = Arc::new(RetryPolicy::from_config(&config.recovery, scale));

        Ok(Self {
            parts: Parts {
                config,
                catalog,
                executor,
                detector,
            },
            coordinator: RecoveryCoordinator::new(policy),
            inner: Mutex::new(Inner {
                view,
                baseline: None,
            }),
        })
    }

    pub fn with_session_provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.coordinator = self.coordinator.with_session_provider(provider);
        self
    }

    pub fn with_retry_policy(mut self, policy: Arc<RetryPolicy>) -> Self {
        self.coordinator = self.coordinator.with_policy(policy);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.parts.config
    }

    pub fn catalog(&self) -> &TargetCatalog {
        &self.parts.catalog
    }

    /// Ceiling and stall grace for a class, with an optional caller ceiling.
    pub fn budget(&self, class: OperationClass, ceiling: Option<Duration>) -> WaitBudget {
        let completion = &self.parts.config.completion;
        let scale = self.parts.config.scale();
        WaitBudget {
            ceiling: ceiling.unwrap_or_else(|| completion.ceiling(class, scale)),
            stall_grace: completion.stall_grace(class, scale),
        }
    }

    pub async fn resolve(
        &self,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<Resolved, EngineError> {
        let spec = self.parts.catalog.require(target)?;
        let mut inner = self.inner.lock().await;
        Ok(self
            .parts
            .executor
            .resolver()
            .resolve(inner.view.as_mut(), spec, cancel)
            .await?)
    }

    /// Single resolution pass without waiting.
    pub async fn resolve_now(&self, target: &str) -> Result<Resolved, EngineError> {
        let spec = self.parts.catalog.require(target)?;
        let mut inner = self.inner.lock().await;
        Ok(self
            .parts
            .executor
            .resolver()
            .resolve_once(inner.view.as_mut(), spec)
            .await?)
    }

    pub async fn execute(
        &self,
        target: &str,
        action: &Action,
        expect: Option<&Expect>,
        cancel: &CancellationToken,
    ) -> ActionResult {
        let spec = match self.parts.catalog.require(target) {
            Ok(spec) => spec,
            Err(err) => return ActionResult::Failed(err),
        };
        let mut inner = self.inner.lock().await;
        self.parts
            .executor
            .execute(inner.view.as_mut(), spec, action, expect, cancel)
            .await
    }

    /// Wait for the generation started by the last `submit`.
    ///
    /// Without a preceding submit, everything on the page counts as new content.
    pub async fn wait_for_completion(
        &self,
        class: OperationClass,
        ceiling: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<CompletionReport, EngineError> {
        let budget = self.budget(class, ceiling);
        let mut inner = self.inner.lock().await;
        let baseline = inner.baseline.take().unwrap_or_default();
        self.parts
            .detector
            .wait(inner.view.as_mut(), baseline, budget, cancel)
            .await
    }

    /// Run any operation under this session's recovery policy.
    pub async fn with_recovery<O: Operation + ?Sized>(
        &self,
        op: &O,
        cancel: &CancellationToken,
    ) -> OperationOutcome<O::Output> {
        let mut inner = self.inner.lock().await;
        self.coordinator.run(inner.view.as_mut(), op, cancel).await
    }

    pub async fn submit(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> OperationOutcome<SubmitReceipt> {
        let op = SubmitOp {
            parts: &self.parts,
            prompt,
        };
        let mut inner = self.inner.lock().await;
        let outcome = self.coordinator.run(inner.view.as_mut(), &op, cancel).await;
        if let Some(receipt) = &outcome.value {
            inner.baseline = Some(receipt.baseline.clone());
        }
        outcome
    }

    pub async fn ask(
        &self,
        prompt: &str,
        class: OperationClass,
        ceiling: Option<Duration>,
        cancel: &CancellationToken,
    ) -> OperationOutcome<Answer> {
        let op = AskOp {
            parts: &self.parts,
            prompt,
            budget: self.budget(class, ceiling),
        };
        info!(%class, "Asking");
        let mut inner = self.inner.lock().await;
        inner.baseline = None;
        self.coordinator.run(inner.view.as_mut(), &op, cancel).await
    }

    pub async fn regenerate(
        &self,
        class: OperationClass,
        ceiling: Option<Duration>,
        cancel: &CancellationToken,
    ) -> OperationOutcome<CompletionReport> {
        let op = RegenerateOp {
            parts: &self.parts,
            budget: self.budget(class, ceiling),
        };
        let mut inner = self.inner.lock().await;
        inner.baseline = None;
        self.coordinator.run(inner.view.as_mut(), &op, cancel).await
    }

    pub async fn new_chat(&self, cancel: &CancellationToken) -> OperationOutcome<()> {
        let op = NewChatOp { parts: &self.parts };
        let mut inner = self.inner.lock().await;
        inner.baseline = None;
        self.coordinator.run(inner.view.as_mut(), &op, cancel).await
    }

    pub async fn attach_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> OperationOutcome<Resolved> {
        let op = AttachFileOp {
            parts: &self.parts,
            path: path.to_path_buf(),
        };
        let mut inner = self.inner.lock().await;
        self.coordinator.run(inner.view.as_mut(), &op, cancel).await
    }

    /// Label of the model picker, when it names a model.
    pub async fn current_model(&self) -> Result<Option<String>, EngineError> {
        let mut inner = self.inner.lock().await;
        model::read_model(&self.parts, inner.view.as_mut()).await
    }

    /// Pick a model by name or alias (`4o`, `o3-mini`). Yields the picker label
    /// once it shows the model.
    pub async fn select_model(
        &self,
        model: &str,
        cancel: &CancellationToken,
    ) -> OperationOutcome<String> {
        let op = SelectModelOp {
            parts: &self.parts,
            model,
        };
        let mut inner = self.inner.lock().await;
        self.coordinator.run(inner.view.as_mut(), &op, cancel).await
    }

    /// Replace the user message at `index` (zero-based among user messages) and
    /// wait for the new answer.
    pub async fn edit_message(
        &self,
        index: usize,
        content: &str,
        class: OperationClass,
        ceiling: Option<Duration>,
        cancel: &CancellationToken,
    ) -> OperationOutcome<CompletionReport> {
        let op = EditMessageOp {
            parts: &self.parts,
            index,
            content,
            budget: self.budget(class, ceiling),
        };
        let mut inner = self.inner.lock().await;
        inner.baseline = None;
        self.coordinator.run(inner.view.as_mut(), &op, cancel).await
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationEntry>, EngineError> {
        let mut inner = self.inner.lock().await;
        history::list_conversations(&self.parts, inner.view.as_mut()).await
    }

    pub async fn switch_conversation(
        &self,
        target: &ConversationRef,
        cancel: &CancellationToken,
    ) -> OperationOutcome<()> {
        let op = SwitchConversationOp {
            parts: &self.parts,
            target,
        };
        info!(%target, "Switching conversation");
        let mut inner = self.inner.lock().await;
        inner.baseline = None;
        self.coordinator.run(inner.view.as_mut(), &op, cancel).await
    }

    /// Text of the last assistant message with the role label removed.
    pub async fn last_response(&self) -> Result<Option<String>, EngineError> {
        let spec = self.parts.catalog.require(ASSISTANT_MESSAGE)?;
        let mut inner = self.inner.lock().await;
        let collected = self
            .parts
            .executor
            .resolver()
            .collect(inner.view.as_mut(), spec)
            .await?;
        Ok(collected
            .and_then(|c| c.elements.last().map(|e| strip_role_label(&e.text)))
            .filter(|t| !t.is_empty()))
    }

    /// All turns in document order.
    ///
    /// Roles come from `data-message-author-role` when the turn carries it and
    /// otherwise alternate starting with the user.
    pub async fn conversation(&self) -> Result<Vec<Turn>, EngineError> {
        let spec = self.parts.catalog.require(CONVERSATION_TURN)?;
        let mut inner = self.inner.lock().await;
        let Some(collected) = self
            .parts
            .executor
            .resolver()
            .collect(inner.view.as_mut(), spec)
            .await?
        else {
            return Ok(Vec::new());
        };

        Ok(collected
            .elements
            .iter()
            .enumerate()
            .map(|(i, el)| {
                let role = match el.attr("data-message-author-role") {
                    Some("assistant") => Role::Assistant,
                    Some("user") => Role::User,
                    _ if i % 2 == 0 => Role::User,
                    _ => Role::Assistant,
                };
                Turn {
                    role,
                    content: strip_role_label(&el.text),
                }
            })
            .collect())
    }

    /// The composer resolves within a short budget.
    pub async fn is_ready(&self) -> bool {
        let Ok(spec) = self.parts.catalog.require(MESSAGE_INPUT) else {
            return false;
        };
        let budget = self.parts.config.resolver.ready_budget(self.parts.config.scale());
        let mut inner = self.inner.lock().await;
        let resolver = self.parts.executor.resolver();
        match resolver
            .resolve_within(inner.view.as_mut(), spec, budget, &CancellationToken::new())
            .await
        {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "Composer not ready");
                false
            }
        }
    }

    pub async fn session_state(&self) -> Result<SessionState, EngineError> {
        let login = self.parts.catalog.require(LOGIN_INDICATOR)?;
        let input = self.parts.catalog.require(MESSAGE_INPUT)?;
        let mut inner = self.inner.lock().await;
        let resolver = self.parts.executor.resolver();

        if let Some(found) = resolver.collect(inner.view.as_mut(), login).await?
            && found.elements.iter().any(|e| e.visible)
        {
            return Ok(SessionState::LoginRequired);
        }
        if resolver.collect(inner.view.as_mut(), input).await?.is_some() {
            return Ok(SessionState::Ready);
        }
        Ok(SessionState::Unknown)
    }

    /// Close the underlying view.
    pub async fn close(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        inner.view.close().await?;
        Ok(())
    }
}
