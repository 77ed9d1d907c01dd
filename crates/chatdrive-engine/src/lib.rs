pub mod completion;
pub mod config;
pub mod error;
pub mod executor;
pub mod locator;
pub mod recovery;
pub mod session;
pub mod targets;
pub mod timeouts;
pub mod view;

pub use chatdrive_common::error_mapping;
pub use chatdrive_common::protocol;
pub use error::EngineError;
pub use session::Session;
pub use view::DocumentView;
