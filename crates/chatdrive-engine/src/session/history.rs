//! Conversation history in the sidebar.

use super::Parts;
use super::ops::explain_missing_input;
use crate::error::EngineError;
use crate::executor::{Action, Expect};
use crate::locator::Disambiguation;
use crate::recovery::Operation;
use crate::targets::{CONVERSATION_LINK, MESSAGE_INPUT};
use crate::view::DocumentView;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Prefix for ids of entries without a link, which can only be clicked.
const POSITIONAL_PREFIX: &str = "conv_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Last path segment of the link, or `conv_<n>` when there is none.
    pub id: String,
    pub title: String,
    /// Position among the matched history items, including untitled ones.
    pub index: usize,
}

impl ConversationEntry {
    pub fn is_positional(&self) -> bool {
        self.id.starts_with(POSITIONAL_PREFIX)
    }
}

/// Which conversation to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationRef {
    /// Position in the list returned by `list_conversations`.
    Index(usize),
    Id(String),
}

impl fmt::Display for ConversationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationRef::Index(i) => write!(f, "#{}", i),
            ConversationRef::Id(id) => f.write_str(id),
        }
    }
}

/// A bare number selects by position, anything else is an id.
impl From<&str> for ConversationRef {
    fn from(s: &str) -> Self {
        match s.trim().parse::<usize>() {
            Ok(i) => ConversationRef::Index(i),
            Err(_) => ConversationRef::Id(s.trim().to_string()),
        }
    }
}

fn id_from_href(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}

pub fn conversation_url(home_url: &str, id: &str) -> String {
    format!("{}/c/{}", home_url.trim_end_matches('/'), id)
}

pub(crate) async fn list_conversations(
    parts: &Parts,
    view: &mut dyn DocumentView,
) -> Result<Vec<ConversationEntry>, EngineError> {
    let spec = parts.catalog.require(CONVERSATION_LINK)?;
    let Some(collected) = parts.executor.resolver().collect(view, spec).await? else {
        return Ok(Vec::new());
    };

    let entries: Vec<ConversationEntry> = collected
        .elements
        .iter()
        .enumerate()
        .filter_map(|(index, el)| {
            let title = el.text.trim();
            if title.is_empty() {
                return None;
            }
            let id = el
                .attr("href")
                .and_then(id_from_href)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}{}", POSITIONAL_PREFIX, index));
            Some(ConversationEntry {
                id,
                title: title.to_string(),
                index,
            })
        })
        .collect();
    info!(count = entries.len(), "Listed conversations");
    Ok(entries)
}

pub(crate) struct SwitchConversationOp<'a> {
    pub parts: &'a Parts,
    pub target: &'a ConversationRef,
}

impl<'a> SwitchConversationOp<'a> {
    async fn open_by_id(
        &self,
        view: &mut dyn DocumentView,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let url = conversation_url(&self.parts.config.home_url, id);
        view.navigate(&url).await?;
        let input = self.parts.catalog.require(MESSAGE_INPUT)?;
        if let Err(err) = self.parts.executor.resolver().resolve(view, input, cancel).await {
            return Err(explain_missing_input(self.parts, view, err.into()).await);
        }
        info!(%url, "Switched conversation");
        Ok(())
    }
}

#[async_trait]
impl<'a> Operation for SwitchConversationOp<'a> {
    type Output = ();

    fn name(&self) -> &str {
        "switch_conversation"
    }

    async fn run(
        &self,
        view: &mut dyn DocumentView,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let entry = match self.target {
            ConversationRef::Id(id) => {
                let valid = !id.is_empty()
                    && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
                if !valid {
                    return Err(EngineError::InvalidInput(format!(
                        "'{}' is not a conversation id",
                        id
                    )));
                }
                if !id.starts_with(POSITIONAL_PREFIX) {
                    return self.open_by_id(view, id, cancel).await;
                }
                list_conversations(self.parts, view)
                    .await?
                    .into_iter()
                    .find(|e| &e.id == id)
            }
            ConversationRef::Index(i) => {
                list_conversations(self.parts, view).await?.get(*i).cloned()
            }
        };
        let Some(entry) = entry else {
            return Err(EngineError::InvalidInput(format!(
                "no conversation {} in the history",
                self.target
            )));
        };
        if !entry.is_positional() {
            return self.open_by_id(view, &entry.id, cancel).await;
        }

        let link = self
            .parts
            .catalog
            .require(CONVERSATION_LINK)?
            .clone()
            .policy(Disambiguation::Nth { index: entry.index });
        let input = self.parts.catalog.require(MESSAGE_INPUT)?.clone();
        self.parts
            .executor
            .execute(view, &link, &Action::Click, Some(&Expect::Appears(input)), cancel)
            .await
            .into_result()?;
        info!(title = %entry.title, "Switched conversation");
        Ok(())
    }
}
