//! Atomic, cross-platform filesystem primitives.
//!
//! Everything the build/fetch/resolve pipeline needs on top of
//! `std::fs`/`tokio::fs`: creating a directory tree without racing a
//! concurrent creator, and writing a file so a reader never observes a
//! partial write.

pub mod atomic;
pub mod dirs;

pub use atomic::{atomic_write, safe_write};
pub use dirs::ensure_dir;
