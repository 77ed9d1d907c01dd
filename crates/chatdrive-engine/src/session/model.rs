//! Reading and switching the active model through the picker.

use super::Parts;
use crate::error::EngineError;
use crate::executor::{Action, Expect};
use crate::locator::LocatorSpec;
use crate::recovery::Operation;
use crate::targets::{MODEL_MENU, MODEL_OPTION, MODEL_PICKER};
use crate::view::DocumentView;
use async_trait::async_trait;
use chatdrive_common::error::ViewError;
use chatdrive_common::protocol::{Descriptor, MatchMode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Name fragments that only show up in a picker labelled with a model.
const MODEL_TOKENS: &[&str] = &["gpt", "o1", "o3", "o4", "claude"];

/// Labels the picker may use for a model name as typed by a caller.
pub fn model_aliases(model: &str) -> Vec<String> {
    let model = model.trim();
    let known: &[&str] = match model.to_lowercase().as_str() {
        "gpt-4" => &["GPT-4", "GPT 4"],
        "gpt-4.5" => &["GPT-4.5", "GPT 4.5"],
        "4o" | "gpt-4o" => &["GPT-4o", "4o"],
        "o1-preview" => &["o1-preview", "o1 preview"],
        "o1-mini" => &["o1-mini", "o1 mini"],
        "o3-mini" => &["o3-mini", "o3 mini"],
        _ => &[],
    };
    let mut aliases: Vec<String> = known.iter().map(|a| a.to_string()).collect();
    if !aliases.iter().any(|a| a.eq_ignore_ascii_case(model)) {
        aliases.insert(0, model.to_string());
    }
    aliases
}

/// Whether the picker label names this alias, so that `GPT-4` does not match
/// `GPT-4o` and `o3` does not match `o3-mini`.
pub fn names_model(shown: &str, alias: &str) -> bool {
    let shown = shown.to_lowercase();
    let alias = alias.trim().to_lowercase();
    if alias.is_empty() {
        return false;
    }
    shown.match_indices(&alias).any(|(at, _)| {
        let before = shown[..at].chars().next_back();
        let after = shown[at + alias.len()..].chars().next();
        let boundary = |c: Option<char>| !c.is_some_and(|c| c.is_alphanumeric() || c == '.');
        boundary(before) && boundary(after) && !matches!(after, Some('-'))
    })
}

fn looks_like_model(text: &str) -> bool {
    let lower = text.to_lowercase();
    MODEL_TOKENS.iter().any(|t| lower.contains(t))
}

/// Label of the first visible picker that reads like a model name.
pub(crate) async fn read_model(
    parts: &Parts,
    view: &mut dyn DocumentView,
) -> Result<Option<String>, EngineError> {
    let picker = parts.catalog.require(MODEL_PICKER)?;
    for descriptor in &picker.descriptors {
        let elements = match view.query(descriptor).await {
            Ok(elements) => elements,
            Err(ViewError::ConnectionLost) => return Err(ViewError::ConnectionLost.into()),
            Err(e) => {
                debug!(%descriptor, error = %e, "Skipping picker descriptor");
                continue;
            }
        };
        let label = elements
            .iter()
            .filter(|e| e.visible)
            .filter_map(|e| e.text.lines().map(str::trim).find(|l| !l.is_empty()))
            .find(|l| looks_like_model(l));
        if let Some(label) = label {
            return Ok(Some(label.to_string()));
        }
    }
    Ok(None)
}

/// One text descriptor per option container and alias, aliases first.
fn option_spec(options: &LocatorSpec, aliases: &[String]) -> LocatorSpec {
    let mut spec = LocatorSpec::new(options.target.clone()).policy(options.policy.clone());
    for alias in aliases {
        for container in &options.descriptors {
            if let Descriptor::Css { selector } = container {
                spec = spec.with(Descriptor::text(
                    Some(selector.as_str()),
                    alias.as_str(),
                    MatchMode::Contains,
                ));
            }
        }
    }
    spec
}

pub(crate) struct SelectModelOp<'a> {
    pub parts: &'a Parts,
    pub model: &'a str,
}

#[async_trait]
impl<'a> Operation for SelectModelOp<'a> {
    type Output = String;

    fn name(&self) -> &str {
        "select_model"
    }

    async fn run(
        &self,
        view: &mut dyn DocumentView,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        if self.model.trim().is_empty() {
            return Err(EngineError::InvalidInput("model name is empty".into()));
        }
        let aliases = model_aliases(self.model);
        let selected = |shown: &str| aliases.iter().any(|a| names_model(shown, a));

        if let Some(current) = read_model(self.parts, view).await?
            && selected(&current)
        {
            info!(model = %current, "Model already selected");
            return Ok(current);
        }

        let picker = self.parts.catalog.require(MODEL_PICKER)?;
        let menu = self.parts.catalog.require(MODEL_MENU)?.clone();
        let opened = Expect::Appears(menu.clone());
        self.parts
            .executor
            .execute(view, picker, &Action::Click, Some(&opened), cancel)
            .await
            .into_result()?;

        let option = option_spec(self.parts.catalog.require(MODEL_OPTION)?, &aliases);
        let closed = Expect::Any(vec![Expect::Disappears(menu), Expect::TargetChanged]);
        self.parts
            .executor
            .execute(view, &option, &Action::Click, Some(&closed), cancel)
            .await
            .into_result()?;

        match read_model(self.parts, view).await? {
            Some(now) if selected(&now) => {
                info!(model = %now, "Model selected");
                Ok(now)
            }
            shown => Err(EngineError::ActionNotConfirmed {
                target: picker.target.clone(),
                action: "select_model".into(),
                detail: format!(
                    "picker shows {} instead of {}",
                    shown.as_deref().unwrap_or("nothing"),
                    self.model
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!(model_aliases("4o"), vec!["GPT-4o", "4o"]);
        assert_eq!(model_aliases("gpt-4o"), vec!["GPT-4o", "4o"]);
        assert_eq!(model_aliases("o3-mini"), vec!["o3-mini", "o3 mini"]);
        assert_eq!(model_aliases("GPT-5 Thinking"), vec!["GPT-5 Thinking"]);
    }

    #[test]
    fn test_names_model_respects_boundaries() {
        assert!(names_model("ChatGPT 4o", "4o"));
        assert!(names_model("GPT-4", "gpt-4"));
        assert!(!names_model("GPT-4o", "GPT-4"));
        assert!(!names_model("GPT-4.5", "GPT-4"));
        assert!(!names_model("o3-mini", "o3"));
        assert!(names_model("o3-mini", "o3-mini"));
        assert!(names_model("Model: o1 preview", "o1 preview"));
        assert!(!names_model("anything", ""));
    }

    #[test]
    fn test_option_spec_crosses_aliases_and_containers() {
        let options = LocatorSpec::new(MODEL_OPTION)
            .with(Descriptor::css("[role=\"menuitem\"]"))
            .with(Descriptor::test_id("ignored"))
            .with(Descriptor::css("[role=\"option\"]"));
        let spec = option_spec(&options, &["GPT-4o".into(), "4o".into()]);
        assert_eq!(spec.descriptors.len(), 4);
        assert_eq!(
            spec.descriptors[0],
            Descriptor::text(Some("[role=\"menuitem\"]"), "GPT-4o", MatchMode::Contains)
        );
        assert_eq!(
            spec.descriptors[3],
            Descriptor::text(Some("[role=\"option\"]"), "4o", MatchMode::Contains)
        );
    }
}
