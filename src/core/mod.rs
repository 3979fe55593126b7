// Public modules
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod lock;
pub mod marker;
pub mod pipeline;
pub mod remote;
pub mod ssh;
pub mod transfer;
pub mod trigger;

// Re-export common types for convenience
pub use error::{Error, ErrorCategory, ErrorCode, Result};
