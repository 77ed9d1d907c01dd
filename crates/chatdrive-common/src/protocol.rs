use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Custom deserializer for HashMap<String, String> that filters out null values.
/// The page probe reports attributes it looked for but did not find as null.
fn deserialize_nullable_string_map<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: HashMap<String, Option<String>> = HashMap::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| v.map(|val| (k, val)))
        .collect())
}

fn default_true() -> bool {
    true
}

/// How a textual descriptor compares its expected text with the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    #[default]
    Contains,
    Prefix,
}

/// One concrete matching rule for a semantic target.
///
/// Descriptors are plain data: the page probe evaluates them against the live
/// document, and test views can key on them directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Descriptor {
    /// Raw CSS selector.
    Css { selector: String },
    /// `[data-testid="..."]`
    TestId { id: String },
    /// Attribute comparison, optionally restricted to one tag name.
    Attribute {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
        name: String,
        value: String,
        #[serde(default)]
        mode: MatchMode,
    },
    /// Visible text. Without a tag only the innermost elements carrying the
    /// text are reported, never their ancestors.
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
        text: String,
        #[serde(default)]
        mode: MatchMode,
    },
    /// Accessibility role (explicit or implicit) with an optional accessible name.
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Input or textarea placeholder, or contenteditable `data-placeholder`.
    Placeholder { text: String },
    /// Positional heuristic: the nth match of a selector. Negative indices
    /// count from the end, so `-1` is the last match.
    Nth { selector: String, index: i32 },
}

impl Descriptor {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId { id: id.into() }
    }

    pub fn attribute(
        tag: Option<&str>,
        name: impl Into<String>,
        value: impl Into<String>,
        mode: MatchMode,
    ) -> Self {
        Self::Attribute {
            tag: tag.map(str::to_string),
            name: name.into(),
            value: value.into(),
            mode,
        }
    }

    pub fn aria_label(tag: &str, label: impl Into<String>, mode: MatchMode) -> Self {
        Self::attribute(Some(tag), "aria-label", label, mode)
    }

    pub fn text(tag: Option<&str>, text: impl Into<String>, mode: MatchMode) -> Self {
        Self::Text {
            tag: tag.map(str::to_string),
            text: text.into(),
            mode,
        }
    }

    pub fn role(role: impl Into<String>, name: Option<&str>) -> Self {
        Self::Role {
            role: role.into(),
            name: name.map(str::to_string),
        }
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::Placeholder { text: text.into() }
    }

    pub fn nth(selector: impl Into<String>, index: i32) -> Self {
        Self::Nth {
            selector: selector.into(),
            index,
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Css { selector } => write!(f, "css({})", selector),
            Descriptor::TestId { id } => write!(f, "test-id({})", id),
            Descriptor::Attribute {
                tag,
                name,
                value,
                mode,
            } => write!(
                f,
                "attr({}[{} {:?} {:?}])",
                tag.as_deref().unwrap_or("*"),
                name,
                mode,
                value
            ),
            Descriptor::Text { tag, text, mode } => write!(
                f,
                "text({} {:?} {:?})",
                tag.as_deref().unwrap_or("*"),
                mode,
                text
            ),
            Descriptor::Role { role, name } => match name {
                Some(name) => write!(f, "role({} {:?})", role, name),
                None => write!(f, "role({})", role),
            },
            Descriptor::Placeholder { text } => write!(f, "placeholder({:?})", text),
            Descriptor::Nth { selector, index } => write!(f, "nth({}, {})", selector, index),
        }
    }
}

/// Snapshot of one live element as reported by the document view.
///
/// `id` is assigned by the view and stays valid until the node is detached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: u32,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "deserialize_nullable_string_map")]
    pub attributes: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub file_count: usize,
}

impl Element {
    pub fn new(id: u32, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            text: String::new(),
            value: None,
            attributes: HashMap::new(),
            visible: true,
            enabled: true,
            file_count: 0,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Value for form controls, visible text for everything else
    /// (contenteditable inputs report their text).
    pub fn current_value(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.text)
    }

    /// True when nothing observable differs between two snapshots of the same node.
    pub fn same_state(&self, other: &Element) -> bool {
        self.tag == other.tag
            && self.text == other.text
            && self.value == other.value
            && self.attributes == other.attributes
            && self.visible == other.visible
            && self.enabled == other.enabled
            && self.file_count == other.file_count
    }
}

/// Requests evaluated by the injected page probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProbeAction {
    Query { descriptor: Descriptor },
    Inspect { id: u32 },
    Click { id: u32 },
    SetText { id: u32, text: String },
    Focus { id: u32 },
    State,
}

/// Responses received from the page probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeResponse {
    Ok {
        #[serde(default)]
        data: serde_json::Value,
    },
    Error {
        code: String,
        message: String,
        #[serde(default)]
        details: Option<serde_json::Value>,
    },
}

/// Document-level state reported by `ProbeAction::State`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    pub ready_state: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl PageState {
    pub fn is_loading(&self) -> bool {
        self.ready_state != "complete"
    }
}
