use chatdrive_common::protocol::{Descriptor, Element};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, version-independent name of a UI target (e.g. `send-button`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SemanticTarget(String);

impl SemanticTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SemanticTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SemanticTarget {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How several live matches of one descriptor are reduced to a single element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Disambiguation {
    /// More than one match is ambiguous.
    #[default]
    Unique,
    FirstInDocument,
    LastInDocument,
    FirstVisible,
    FirstEnabled,
    /// The match at this position in document order. Fewer matches is a miss,
    /// not an ambiguity.
    Nth { index: usize },
    /// First match carrying the attribute (with the given value, if any).
    WithAttribute {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
}

impl Disambiguation {
    /// Pick one element out of several matches; `None` means still ambiguous.
    pub fn pick<'a>(&self, matches: &'a [Element]) -> Option<&'a Element> {
        if let Disambiguation::Nth { index } = self {
            return matches.get(*index);
        }
        if matches.len() == 1 {
            return matches.first();
        }
        match self {
            Disambiguation::Unique => None,
            Disambiguation::FirstInDocument => matches.first(),
            Disambiguation::LastInDocument => matches.last(),
            Disambiguation::FirstVisible => matches.iter().find(|e| e.visible),
            Disambiguation::FirstEnabled => matches.iter().find(|e| e.visible && e.enabled),
            Disambiguation::Nth { index } => matches.get(*index),
            Disambiguation::WithAttribute { name, value } => matches.iter().find(|e| {
                match (e.attr(name), value) {
                    (Some(actual), Some(expected)) => actual == expected,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
            }),
        }
    }

    pub fn is_positional(&self) -> bool {
        matches!(self, Disambiguation::Nth { .. })
    }
}

/// Ranked descriptors for one semantic target. Priority equals position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorSpec {
    pub target: SemanticTarget,
    pub descriptors: Vec<Descriptor>,
    #[serde(default)]
    pub policy: Disambiguation,
}

impl LocatorSpec {
    pub fn new(target: impl Into<SemanticTarget>) -> Self {
        Self {
            target: target.into(),
            descriptors: Vec::new(),
            policy: Disambiguation::Unique,
        }
    }

    pub fn with(mut self, descriptor: Descriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn policy(mut self, policy: Disambiguation) -> Self {
        self.policy = policy;
        self
    }

    /// Put extra descriptors ahead of the existing ones, skipping duplicates.
    pub fn prepend(mut self, extra: &[Descriptor]) -> Self {
        let mut merged: Vec<Descriptor> = extra.to_vec();
        for d in self.descriptors.drain(..) {
            if !merged.contains(&d) {
                merged.push(d);
            }
        }
        self.descriptors = merged;
        self
    }
}
