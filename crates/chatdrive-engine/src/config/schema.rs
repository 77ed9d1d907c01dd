use crate::recovery::ErrorCategory;
use crate::timeouts::OperationClass;
use chatdrive_common::protocol::Descriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const TIMING_SCALE_ENV: &str = "CHATDRIVE_TIMING_SCALE";
pub const MIN_TIMING_SCALE: f64 = 0.1;

/// Largest multiplier accepted; anything beyond is treated as this.
pub const MAX_TIMING_SCALE: f64 = 1000.0;

/// Clamp a configured scale into the supported range. Non-finite values fall back to 1.0.
pub fn clamp_scale(scale: f64) -> f64 {
    if !scale.is_finite() {
        return 1.0;
    }
    scale.clamp(MIN_TIMING_SCALE, MAX_TIMING_SCALE)
}

fn scaled(ms: u64, scale: f64) -> Duration {
    let base = Duration::from_millis(ms);
    if scale == 1.0 {
        return base;
    }
    Duration::try_from_secs_f64(base.as_secs_f64() * clamp_scale(scale)).unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Multiplier applied to every configured duration.
    #[serde(default = "default_timing_scale")]
    pub timing_scale: f64,
    #[serde(default = "default_home_url")]
    pub home_url: String,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Extra descriptors per semantic target, tried before the built-in ones.
    #[serde(default)]
    pub targets: HashMap<String, Vec<Descriptor>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timing_scale: default_timing_scale(),
            home_url: default_home_url(),
            resolver: ResolverConfig::default(),
            executor: ExecutorConfig::default(),
            completion: CompletionConfig::default(),
            recovery: RecoveryConfig::default(),
            targets: HashMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn scale(&self) -> f64 {
        clamp_scale(self.timing_scale)
    }

    /// Apply `CHATDRIVE_TIMING_SCALE` if it is set to a finite number.
    pub fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var(TIMING_SCALE_ENV)
            && let Ok(scale) = raw.trim().parse::<f64>()
            && scale.is_finite()
        {
            self.timing_scale = clamp_scale(scale);
        }
    }
}

fn default_timing_scale() -> f64 {
    1.0
}

fn default_home_url() -> String {
    "https://chatgpt.com/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_resolve_budget_ms")]
    pub budget_ms: u64,
    #[serde(default = "default_resolve_initial_poll_ms")]
    pub initial_poll_ms: u64,
    #[serde(default = "default_resolve_max_poll_ms")]
    pub max_poll_ms: u64,
    /// Budget for the quick composer check behind `is_ready`.
    #[serde(default = "default_ready_budget_ms")]
    pub ready_budget_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            budget_ms: default_resolve_budget_ms(),
            initial_poll_ms: default_resolve_initial_poll_ms(),
            max_poll_ms: default_resolve_max_poll_ms(),
            ready_budget_ms: default_ready_budget_ms(),
        }
    }
}

impl ResolverConfig {
    pub fn budget(&self, scale: f64) -> Duration {
        scaled(self.budget_ms, scale)
    }

    pub fn initial_poll(&self, scale: f64) -> Duration {
        scaled(self.initial_poll_ms, scale)
    }

    pub fn max_poll(&self, scale: f64) -> Duration {
        scaled(self.max_poll_ms, scale)
    }

    pub fn ready_budget(&self, scale: f64) -> Duration {
        scaled(self.ready_budget_ms, scale)
    }
}

fn default_resolve_budget_ms() -> u64 {
    10000
}

fn default_resolve_initial_poll_ms() -> u64 {
    100
}

fn default_resolve_max_poll_ms() -> u64 {
    1000
}

fn default_ready_budget_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,
    #[serde(default = "default_settle_poll_ms")]
    pub settle_poll_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            settle_window_ms: default_settle_window_ms(),
            settle_poll_ms: default_settle_poll_ms(),
        }
    }
}

impl ExecutorConfig {
    pub fn settle_window(&self, scale: f64) -> Duration {
        scaled(self.settle_window_ms, scale)
    }

    pub fn settle_poll(&self, scale: f64) -> Duration {
        scaled(self.settle_poll_ms, scale)
    }
}

fn default_settle_window_ms() -> u64 {
    3000
}

fn default_settle_poll_ms() -> u64 {
    100
}

/// Ceiling and stall grace for one operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLimits {
    pub ceiling_ms: u64,
    pub stall_grace_ms: u64,
}

impl ClassLimits {
    fn for_class(class: OperationClass) -> Self {
        Self {
            ceiling_ms: class.default_ceiling().as_millis() as u64,
            stall_grace_ms: class.default_stall_grace().as_millis() as u64,
        }
    }
}

fn default_interactive_limits() -> ClassLimits {
    ClassLimits::for_class(OperationClass::Interactive)
}

fn default_reasoning_limits() -> ClassLimits {
    ClassLimits::for_class(OperationClass::ExtendedReasoning)
}

fn default_research_limits() -> ClassLimits {
    ClassLimits::for_class(OperationClass::ExtendedResearch)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_stall_rechecks")]
    pub stall_rechecks: u32,
    /// Consecutive failed polls tolerated while the page is still reachable.
    #[serde(default = "default_observe_error_tolerance")]
    pub observe_error_tolerance: u32,
    #[serde(default = "default_completion_initial_poll_ms")]
    pub initial_poll_ms: u64,
    #[serde(default = "default_completion_max_poll_ms")]
    pub max_poll_ms: u64,
    #[serde(default = "default_poll_growth")]
    pub poll_growth: f64,
    #[serde(default = "default_interactive_limits")]
    pub interactive: ClassLimits,
    #[serde(default = "default_reasoning_limits")]
    pub extended_reasoning: ClassLimits,
    #[serde(default = "default_research_limits")]
    pub extended_research: ClassLimits,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            stall_rechecks: default_stall_rechecks(),
            observe_error_tolerance: default_observe_error_tolerance(),
            initial_poll_ms: default_completion_initial_poll_ms(),
            max_poll_ms: default_completion_max_poll_ms(),
            poll_growth: default_poll_growth(),
            interactive: default_interactive_limits(),
            extended_reasoning: default_reasoning_limits(),
            extended_research: default_research_limits(),
        }
    }
}

impl CompletionConfig {
    pub fn limits(&self, class: OperationClass) -> ClassLimits {
        match class {
            OperationClass::Interactive => self.interactive,
            OperationClass::ExtendedReasoning => self.extended_reasoning,
            OperationClass::ExtendedResearch => self.extended_research,
        }
    }

    pub fn ceiling(&self, class: OperationClass, scale: f64) -> Duration {
        scaled(self.limits(class).ceiling_ms, scale)
    }

    pub fn stall_grace(&self, class: OperationClass, scale: f64) -> Duration {
        scaled(self.limits(class).stall_grace_ms, scale)
    }

    pub fn cooldown(&self, scale: f64) -> Duration {
        scaled(self.cooldown_ms, scale)
    }

    pub fn initial_poll(&self, scale: f64) -> Duration {
        scaled(self.initial_poll_ms, scale)
    }

    pub fn max_poll(&self, scale: f64) -> Duration {
        scaled(self.max_poll_ms, scale)
    }
}

fn default_cooldown_ms() -> u64 {
    1500
}

fn default_stall_rechecks() -> u32 {
    3
}

fn default_observe_error_tolerance() -> u32 {
    3
}

fn default_completion_initial_poll_ms() -> u64 {
    250
}

fn default_completion_max_poll_ms() -> u64 {
    5000
}

fn default_poll_growth() -> f64 {
    1.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Fraction of the delay added or removed at random, 0.0 to 1.0.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    #[serde(default = "default_retryable")]
    pub retryable: Vec<ErrorCategory>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            retryable: default_retryable(),
        }
    }
}

impl RecoveryConfig {
    pub fn base_delay(&self, scale: f64) -> Duration {
        scaled(self.base_delay_ms, scale)
    }

    pub fn max_delay(&self, scale: f64) -> Duration {
        scaled(self.max_delay_ms, scale)
    }

    pub fn rate_limit_delay(&self, scale: f64) -> Duration {
        scaled(self.rate_limit_delay_ms, scale)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_jitter() -> f64 {
    0.2
}

fn default_rate_limit_delay_ms() -> u64 {
    30000
}

fn default_retryable() -> Vec<ErrorCategory> {
    vec![
        ErrorCategory::TransientNetwork,
        ErrorCategory::StaleTarget,
        ErrorCategory::RateLimited,
        ErrorCategory::SessionInvalid,
    ]
}
