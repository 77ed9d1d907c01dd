pub mod error;
pub mod error_mapping;
pub mod protocol;
