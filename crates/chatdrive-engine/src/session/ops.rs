//! Conversation operations run under the recovery coordinator.

use super::Parts;
use crate::completion::{Baseline, CompletionReport, WaitBudget};
use crate::error::EngineError;
use crate::executor::{Action, ActionResult, Expect};
use crate::locator::{Disambiguation, Resolved};
use crate::recovery::Operation;
use crate::targets::{
    EDIT_BUTTON, EDIT_INPUT, EDIT_SUBMIT, FILE_INPUT, LOGIN_INDICATOR, MESSAGE_INPUT, NEW_CHAT,
    REGENERATE_BUTTON, SEND_BUTTON, STOP_BUTTON, USER_MESSAGE,
};
use crate::view::DocumentView;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What `submit` did to get the prompt out.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub input: Resolved,
    /// The send button that was clicked, `None` when Enter was used instead.
    pub send: Option<Resolved>,
    pub via_enter: bool,
    /// Assistant messages present before the prompt went out.
    pub baseline: Baseline,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub receipt: SubmitReceipt,
    pub report: CompletionReport,
}

impl Answer {
    pub fn content(&self) -> &str {
        &self.report.content
    }
}

/// Turn a missing composer into `SessionInvalid` when a login page is showing.
pub(crate) async fn explain_missing_input(
    parts: &Parts,
    view: &mut dyn DocumentView,
    err: EngineError,
) -> EngineError {
    if !matches!(err, EngineError::Resolution(_)) {
        return err;
    }
    let Ok(login) = parts.catalog.require(LOGIN_INDICATOR) else {
        return err;
    };
    match parts.executor.resolver().collect(view, login).await {
        Ok(Some(found)) if found.elements.iter().any(|e| e.visible) => {
            EngineError::SessionInvalid("login page shown instead of the composer".into())
        }
        _ => err,
    }
}

pub(crate) async fn submit_prompt(
    parts: &Parts,
    view: &mut dyn DocumentView,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<SubmitReceipt, EngineError> {
    if prompt.trim().is_empty() {
        return Err(EngineError::InvalidInput("prompt is empty".into()));
    }

    let baseline = parts.detector.baseline(view).await?;
    let input_spec = parts.catalog.require(MESSAGE_INPUT)?;
    let input = match parts
        .executor
        .execute(
            view,
            input_spec,
            &Action::SetText(prompt.to_string()),
            None,
            cancel,
        )
        .await
        .into_result()
    {
        Ok(input) => input,
        Err(err) => return Err(explain_missing_input(parts, view, err).await),
    };

    let stop = parts.catalog.require(STOP_BUTTON)?.clone();
    let send_spec = parts.catalog.require(SEND_BUTTON)?;
    let sent = Expect::Any(vec![Expect::Appears(stop.clone()), Expect::TargetChanged]);

    match parts
        .executor
        .execute(view, send_spec, &Action::Click, Some(&sent), cancel)
        .await
    {
        ActionResult::Succeeded { resolved, .. } => {
            info!(descriptor = resolved.descriptor_index, "Prompt sent");
            Ok(SubmitReceipt {
                input,
                send: Some(resolved),
                via_enter: false,
                baseline,
            })
        }
        ActionResult::Failed(EngineError::Resolution(failure)) => {
            warn!(%failure, "Send button not found, pressing Enter");
            let cleared = Expect::Any(vec![
                Expect::Appears(stop),
                Expect::ValueEquals(String::new()),
            ]);
            parts
                .executor
                .execute(
                    view,
                    input_spec,
                    &Action::PressKey("Enter".into()),
                    Some(&cleared),
                    cancel,
                )
                .await
                .into_result()?;
            Ok(SubmitReceipt {
                input,
                send: None,
                via_enter: true,
                baseline,
            })
        }
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

pub(crate) struct SubmitOp<'a> {
    pub parts: &'a Parts,
    pub prompt: &'a str,
}

#[async_trait]
impl<'a> Operation for SubmitOp<'a> {
    type Output = SubmitReceipt;

    fn name(&self) -> &str {
        "submit"
    }

    async fn run(
        &self,
        view: &mut dyn DocumentView,
        cancel: &CancellationToken,
    ) -> Result<SubmitReceipt, EngineError> {
        submit_prompt(self.parts, view, self.prompt, cancel).await
    }
}

/// Submit and wait. A retry submits the prompt again from a fresh baseline.
pub(crate) struct AskOp<'a> {
    pub parts: &'a Parts,
    pub prompt: &'a str,
    pub budget: WaitBudget,
}

#[async_trait]
impl<'a> Operation for AskOp<'a> {
    type Output = Answer;

    fn name(&self) -> &str {
        "ask"
    }

    async fn run(
        &self,
        view: &mut dyn DocumentView,
        cancel: &CancellationToken,
    ) -> Result<Answer, EngineError> {
        let receipt = submit_prompt(self.parts, view, self.prompt, cancel).await?;
        let report = self
            .parts
            .detector
            .wait(view, receipt.baseline.clone(), self.budget, cancel)
            .await?;
        Ok(Answer { receipt, report })
    }
}

pub(crate) struct RegenerateOp<'a> {
    pub parts: &'a Parts,
    pub budget: WaitBudget,
}

#[async_trait]
impl<'a> Operation for RegenerateOp<'a> {
    type Output = CompletionReport;

    fn name(&self) -> &str {
        "regenerate"
    }

    async fn run(
        &self,
        view: &mut dyn DocumentView,
        cancel: &CancellationToken,
    ) -> Result<CompletionReport, EngineError> {
        let baseline = self.parts.detector.baseline(view).await?;
        let spec = self.parts.catalog.require(REGENERATE_BUTTON)?;
        let stop = self.parts.catalog.require(STOP_BUTTON)?.clone();
        let expect = Expect::Any(vec![Expect::Appears(stop), Expect::TargetChanged]);
        self.parts
            .executor
            .execute(view, spec, &Action::Click, Some(&expect), cancel)
            .await
            .into_result()?;
        // The regenerated answer replaces the last one in place; only new text counts.
        self.parts
            .detector
            .wait(view, baseline, self.budget, cancel)
            .await
    }
}

/// Rewrite an earlier user message and wait for the answer that replaces
/// everything after it.
pub(crate) struct EditMessageOp<'a> {
    pub parts: &'a Parts,
    /// Zero-based among user messages.
    pub index: usize,
    pub content: &'a str,
    pub budget: WaitBudget,
}

#[async_trait]
impl<'a> Operation for EditMessageOp<'a> {
    type Output = CompletionReport;

    fn name(&self) -> &str {
        "edit_message"
    }

    async fn run(
        &self,
        view: &mut dyn DocumentView,
        cancel: &CancellationToken,
    ) -> Result<CompletionReport, EngineError> {
        if self.content.trim().is_empty() {
            return Err(EngineError::InvalidInput("edited message is empty".into()));
        }
        let users = self.parts.catalog.require(USER_MESSAGE)?;
        let count = match self.parts.executor.resolver().collect(view, users).await? {
            Some(c) => c.elements.len(),
            None => 0,
        };
        if self.index >= count {
            return Err(EngineError::InvalidInput(format!(
                "message index {} out of range ({} user messages)",
                self.index, count
            )));
        }

        let baseline = self.parts.detector.rewrite_baseline(view).await?;
        let edit = self
            .parts
            .catalog
            .require(EDIT_BUTTON)?
            .clone()
            .policy(Disambiguation::Nth { index: self.index });
        let input = self.parts.catalog.require(EDIT_INPUT)?;
        let opened = Expect::Appears(input.clone());
        self.parts
            .executor
            .execute(view, &edit, &Action::Click, Some(&opened), cancel)
            .await
            .into_result()?;
        self.parts
            .executor
            .execute(view, input, &Action::SetText(self.content.to_string()), None, cancel)
            .await
            .into_result()?;

        let stop = self.parts.catalog.require(STOP_BUTTON)?.clone();
        let sent = Expect::Any(vec![Expect::Disappears(input.clone()), Expect::Appears(stop)]);
        let submit = self.parts.catalog.require(EDIT_SUBMIT)?;
        match self
            .parts
            .executor
            .execute(view, submit, &Action::Click, Some(&sent), cancel)
            .await
        {
            ActionResult::Succeeded { .. } => {}
            ActionResult::Failed(EngineError::Resolution(failure)) => {
                warn!(%failure, "Edit submit button not found, pressing Enter");
                self.parts
                    .executor
                    .execute(view, input, &Action::PressKey("Enter".into()), Some(&sent), cancel)
                    .await
                    .into_result()?;
            }
            other => {
                other.into_result()?;
            }
        }
        info!(index = self.index, "Message edited");

        self.parts
            .detector
            .wait(view, baseline, self.budget, cancel)
            .await
    }
}

pub(crate) struct NewChatOp<'a> {
    pub parts: &'a Parts,
}

#[async_trait]
impl<'a> Operation for NewChatOp<'a> {
    type Output = ();

    fn name(&self) -> &str {
        "new_chat"
    }

    async fn run(
        &self,
        view: &mut dyn DocumentView,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let input = self.parts.catalog.require(MESSAGE_INPUT)?.clone();
        let spec = self.parts.catalog.require(NEW_CHAT)?;
        let ready = Expect::Appears(input.clone());

        match self
            .parts
            .executor
            .execute(view, spec, &Action::Click, Some(&ready), cancel)
            .await
        {
            ActionResult::Succeeded { .. } => Ok(()),
            ActionResult::Failed(EngineError::Resolution(_)) | ActionResult::Ambiguous { .. } => {
                let home = &self.parts.config.home_url;
                warn!(url = %home, "New chat control not found, navigating home");
                view.navigate(home).await?;
                self.parts
                    .executor
                    .resolver()
                    .resolve(view, &input, cancel)
                    .await?;
                Ok(())
            }
            other => other.into_result().map(|_| ()),
        }
    }
}

pub(crate) struct AttachFileOp<'a> {
    pub parts: &'a Parts,
    pub path: PathBuf,
}

#[async_trait]
impl<'a> Operation for AttachFileOp<'a> {
    type Output = Resolved;

    fn name(&self) -> &str {
        "attach_file"
    }

    async fn run(
        &self,
        view: &mut dyn DocumentView,
        cancel: &CancellationToken,
    ) -> Result<Resolved, EngineError> {
        let spec = self.parts.catalog.require(FILE_INPUT)?;
        self.parts
            .executor
            .execute(view, spec, &Action::Upload(self.path.clone()), None, cancel)
            .await
            .into_result()
    }
}
