//! Built-in locator specs for the chat UI.
//!
//! Descriptors are listed from most to least specific. Test ids and aria labels
//! come first since they survive restyling; text and positional fallbacks last.

use crate::error::EngineError;
use crate::locator::{Disambiguation, LocatorSpec, SemanticTarget};
use chatdrive_common::protocol::{Descriptor, MatchMode};
use std::collections::HashMap;
use tracing::debug;

pub const MESSAGE_INPUT: &str = "message-input";
pub const SEND_BUTTON: &str = "send-button";
pub const STOP_BUTTON: &str = "stop-button";
pub const STREAMING_INDICATOR: &str = "streaming-indicator";
pub const ASSISTANT_MESSAGE: &str = "assistant-message";
pub const CONVERSATION_TURN: &str = "conversation-turn";
pub const ERROR_AFFORDANCE: &str = "error-affordance";
pub const NEW_CHAT: &str = "new-chat";
pub const FILE_INPUT: &str = "file-input";
pub const REGENERATE_BUTTON: &str = "regenerate-button";
pub const LOGIN_INDICATOR: &str = "login-indicator";
pub const MODEL_PICKER: &str = "model-picker";
pub const MODEL_MENU: &str = "model-menu";
pub const MODEL_OPTION: &str = "model-option";
pub const USER_MESSAGE: &str = "user-message";
pub const EDIT_BUTTON: &str = "edit-message-button";
pub const EDIT_INPUT: &str = "edit-message-input";
pub const EDIT_SUBMIT: &str = "edit-message-submit";
pub const CONVERSATION_LINK: &str = "conversation-link";

#[derive(Debug, Clone)]
pub struct TargetCatalog {
    specs: HashMap<SemanticTarget, LocatorSpec>,
}

impl Default for TargetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TargetCatalog {
    pub fn empty() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for spec in builtin_specs() {
            catalog.insert(spec);
        }
        catalog
    }

    pub fn insert(&mut self, spec: LocatorSpec) {
        self.specs.insert(spec.target.clone(), spec);
    }

    /// Prepend configured descriptors per target. Unknown targets become new
    /// specs with the `Unique` policy.
    pub fn with_overrides(mut self, overrides: &HashMap<String, Vec<Descriptor>>) -> Self {
        for (name, extra) in overrides {
            if extra.is_empty() {
                continue;
            }
            let target = SemanticTarget::new(name.as_str());
            let spec = match self.specs.remove(&target) {
                Some(spec) => spec.prepend(extra),
                None => LocatorSpec::new(target).prepend(extra),
            };
            debug!(target_name = %spec.target, count = extra.len(), "Applied descriptor overrides");
            self.insert(spec);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&LocatorSpec> {
        self.specs.get(&SemanticTarget::new(name))
    }

    pub fn require(&self, name: &str) -> Result<&LocatorSpec, EngineError> {
        self.get(name)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown target '{}'", name)))
    }

    pub fn targets(&self) -> impl Iterator<Item = &SemanticTarget> {
        self.specs.keys()
    }
}

fn builtin_specs() -> Vec<LocatorSpec> {
    use MatchMode::{Contains, Exact, Prefix};

    vec![
        // The composer is a contenteditable div in current builds, a textarea in older ones.
        LocatorSpec::new(MESSAGE_INPUT)
            .with(Descriptor::css("#prompt-textarea"))
            .with(Descriptor::css("div.ProseMirror[contenteditable=\"true\"]"))
            .with(Descriptor::placeholder("Message"))
            .with(Descriptor::role("textbox", None))
            .with(Descriptor::nth("form textarea", 0))
            .policy(Disambiguation::FirstVisible),
        LocatorSpec::new(SEND_BUTTON)
            .with(Descriptor::test_id("send-button"))
            .with(Descriptor::aria_label("button", "Send prompt", Exact))
            .with(Descriptor::aria_label("button", "Send message", Exact))
            .with(Descriptor::css("button:has(svg[data-testid=\"send-button\"])"))
            .with(Descriptor::css("#composer-submit-button"))
            .policy(Disambiguation::FirstEnabled),
        LocatorSpec::new(STOP_BUTTON)
            .with(Descriptor::test_id("stop-button"))
            .with(Descriptor::aria_label("button", "Stop", Prefix))
            .with(Descriptor::text(Some("button"), "Stop generating", Contains))
            .policy(Disambiguation::FirstVisible),
        LocatorSpec::new(STREAMING_INDICATOR)
            .with(Descriptor::test_id("thinking-indicator"))
            .with(Descriptor::css(".result-streaming"))
            .with(Descriptor::css(".animate-pulse"))
            .with(Descriptor::text(Some("div"), "Thinking", Exact))
            .policy(Disambiguation::FirstVisible),
        LocatorSpec::new(ASSISTANT_MESSAGE)
            .with(Descriptor::css("[data-message-author-role=\"assistant\"]"))
            .with(Descriptor::css("[data-testid^=\"conversation-turn\"] .markdown"))
            .with(Descriptor::css("div.markdown"))
            .policy(Disambiguation::LastInDocument),
        // Alternates user / assistant in document order.
        LocatorSpec::new(CONVERSATION_TURN)
            .with(Descriptor::test_id("conversation-turn"))
            .with(Descriptor::css("[data-testid^=\"conversation-turn\"]"))
            .with(Descriptor::css("main article"))
            .policy(Disambiguation::LastInDocument),
        LocatorSpec::new(ERROR_AFFORDANCE)
            .with(Descriptor::css("[class*=\"text-token-text-error\"]"))
            .with(Descriptor::css("div[class*=\"text-red\"]"))
            .with(Descriptor::text(None, "Something went wrong", Contains))
            .with(Descriptor::text(None, "Too many requests", Contains))
            .with(Descriptor::role("alert", None))
            .policy(Disambiguation::LastInDocument),
        LocatorSpec::new(NEW_CHAT)
            .with(Descriptor::test_id("create-new-chat-button"))
            .with(Descriptor::test_id("new-chat-button"))
            .with(Descriptor::aria_label("a", "New chat", Exact))
            .with(Descriptor::css("a[href=\"/\"]"))
            .with(Descriptor::text(None, "New chat", Exact))
            .policy(Disambiguation::FirstVisible),
        // File inputs are usually hidden, so visibility is not required here.
        LocatorSpec::new(FILE_INPUT)
            .with(Descriptor::css("input[type=\"file\"]"))
            .with(Descriptor::test_id("file-upload"))
            .with(Descriptor::css("input[accept*=\"image\"]"))
            .policy(Disambiguation::FirstInDocument),
        LocatorSpec::new(REGENERATE_BUTTON)
            .with(Descriptor::aria_label("button", "Regenerate", Contains))
            .with(Descriptor::test_id("regenerate-button"))
            .with(Descriptor::text(Some("button"), "Regenerate", Contains))
            .with(Descriptor::aria_label("button", "Try again", Contains))
            .with(Descriptor::text(Some("button"), "Try again", Contains))
            .policy(Disambiguation::LastInDocument),
        LocatorSpec::new(LOGIN_INDICATOR)
            .with(Descriptor::text(Some("button"), "Log in", Exact))
            .with(Descriptor::text(Some("button"), "Sign up", Exact))
            .with(Descriptor::css("input[type=\"email\"]"))
            .with(Descriptor::css("a[href*=\"auth0.openai.com\"]"))
            .policy(Disambiguation::FirstInDocument),
        // Its text is the current model name.
        LocatorSpec::new(MODEL_PICKER)
            .with(Descriptor::test_id("model-switcher-dropdown-button"))
            .with(Descriptor::test_id("model-picker"))
            .with(Descriptor::css("button[aria-haspopup=\"menu\"][data-state]"))
            .with(Descriptor::css("button:has(svg.icon-chevron-down)"))
            .with(Descriptor::css(".model-selector"))
            .policy(Disambiguation::FirstVisible),
        LocatorSpec::new(MODEL_MENU)
            .with(Descriptor::css("[data-radix-menu-content]"))
            .with(Descriptor::role("menu", None))
            .with(Descriptor::role("listbox", None))
            .policy(Disambiguation::FirstVisible),
        // Containers only; the model name is matched against their text.
        LocatorSpec::new(MODEL_OPTION)
            .with(Descriptor::css("[role=\"menuitem\"]"))
            .with(Descriptor::css("[role=\"option\"]"))
            .with(Descriptor::css("[data-radix-menu-item]"))
            .policy(Disambiguation::FirstVisible),
        LocatorSpec::new(USER_MESSAGE)
            .with(Descriptor::css("[data-message-author-role=\"user\"]"))
            .with(Descriptor::css("div[class*=\"user-message\"]"))
            .policy(Disambiguation::LastInDocument),
        // One per user message, in document order.
        LocatorSpec::new(EDIT_BUTTON)
            .with(Descriptor::aria_label("button", "Edit", Contains))
            .with(Descriptor::css("button:has(svg[class*=\"pencil\"])"))
            .policy(Disambiguation::LastInDocument),
        LocatorSpec::new(EDIT_INPUT)
            .with(Descriptor::aria_label("textarea", "Edit", Contains))
            .with(Descriptor::css("textarea.editing"))
            .with(Descriptor::css("main article textarea"))
            .policy(Disambiguation::FirstVisible),
        LocatorSpec::new(EDIT_SUBMIT)
            .with(Descriptor::aria_label("button", "Save", Contains))
            .with(Descriptor::aria_label("button", "Submit", Contains))
            .with(Descriptor::text(Some("main article button"), "Send", Exact))
            .policy(Disambiguation::FirstEnabled),
        LocatorSpec::new(CONVERSATION_LINK)
            .with(Descriptor::css("nav a[href^=\"/c/\"]"))
            .with(Descriptor::test_id("history-item"))
            .with(Descriptor::test_id("conversation-item"))
            .with(Descriptor::css("a[href^=\"/c/\"]"))
            .policy(Disambiguation::FirstInDocument),
    ]
}
