/// Macro for prefixed status logging to stderr.
///
/// Emits when stderr is a terminal or when running under CI, where pipeline
/// logs are captured from a pipe.
///
/// Usage:
/// ```ignore
/// log_status!("transfer", "Uploading {} to {}", artifact, destination);
/// log_status!("remote", "Restarting {}", service);
/// ```
#[macro_export]
macro_rules! log_status {
    ($prefix:expr, $($arg:tt)*) => {
        if $crate::status_logging_enabled() {
            eprintln!(concat!("[", $prefix, "] {}"), format_args!($($arg)*));
        }
    };
}

#[doc(hidden)]
pub fn status_logging_enabled() -> bool {
    ::std::io::IsTerminal::is_terminal(&::std::io::stderr())
        || std::env::var_os("CI").is_some()
        || std::env::var_os("GITHUB_ACTIONS").is_some()
}

pub mod core;
pub mod utils;

// Re-export everything from core for ergonomic library use
// Users can write `botdeploy::marker` instead of `botdeploy::core::marker`
pub use core::*;
pub use utils::*;
