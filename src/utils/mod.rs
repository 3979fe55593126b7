//! Generic utility primitives with zero domain knowledge.
//!
//! - `base_path` - Remote path joining utilities
//! - `io` - File I/O with consistent error handling
//! - `shell` - Shell escaping and quoting

pub mod base_path;
pub mod io;
pub mod shell;
