pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{
    ClassLimits, CompletionConfig, EngineConfig, ExecutorConfig, RecoveryConfig, ResolverConfig,
    TIMING_SCALE_ENV,
};
