//! Cross-platform filesystem and subprocess helpers.
//!
//! - [`fs`] — atomic writes and directory creation
//! - [`platform`] — the platform git binary name and path normalization

pub mod fs;
pub mod platform;

pub use fs::{ensure_dir, safe_write};
pub use platform::get_git_command;
