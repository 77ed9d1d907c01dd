use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Expected duration class of a generation; scales the completion ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationClass {
    #[default]
    Interactive,
    ExtendedReasoning,
    ExtendedResearch,
}

impl OperationClass {
    /// Infer the class from a model name and an optional mode.
    ///
    /// Research modes win over the model. Reasoning models are recognized by
    /// name tokens such as `pro`, `thinking`, `o1` and `o3`.
    pub fn infer(model: Option<&str>, mode: Option<&str>) -> Self {
        if let Some(mode) = mode {
            let mode = mode.to_lowercase();
            if mode.contains("research") {
                return OperationClass::ExtendedResearch;
            }
            if mode.contains("thinking") || mode.contains("reasoning") {
                return OperationClass::ExtendedReasoning;
            }
        }

        let Some(model) = model else {
            return OperationClass::Interactive;
        };
        let model = model.to_lowercase();
        if model.contains("research") {
            return OperationClass::ExtendedResearch;
        }
        let reasoning = model
            .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
            .any(|token| matches!(token, "pro" | "thinking" | "o1" | "o3"));
        if reasoning {
            OperationClass::ExtendedReasoning
        } else {
            OperationClass::Interactive
        }
    }

    pub fn default_ceiling(self) -> Duration {
        match self {
            OperationClass::Interactive => Duration::from_secs(5 * 60),
            OperationClass::ExtendedReasoning => Duration::from_secs(30 * 60),
            OperationClass::ExtendedResearch => Duration::from_secs(6 * 3600),
        }
    }

    pub fn default_stall_grace(self) -> Duration {
        match self {
            OperationClass::Interactive => Duration::from_secs(2 * 60),
            OperationClass::ExtendedReasoning => Duration::from_secs(15 * 60),
            OperationClass::ExtendedResearch => Duration::from_secs(3600),
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationClass::Interactive => "interactive",
            OperationClass::ExtendedReasoning => "extended-reasoning",
            OperationClass::ExtendedResearch => "extended-research",
        };
        f.write_str(name)
    }
}

/// Human-readable rendering for log lines.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{} seconds", secs)
    } else if secs < 3600 {
        let minutes = secs / 60;
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{} minutes", minutes)
        }
    } else {
        format!("{:.1} hours", secs as f64 / 3600.0)
    }
}
