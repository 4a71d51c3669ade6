//! External I/O plumbing: cancellable subprocess spawning, tree copying, and
//! directory enumeration that can skip subtrees mid-walk.

pub mod fsutil;
pub mod process;

pub use fsutil::{copy_tree, enumerate_dir, DirEntryHandle};
pub use process::{spawn, spawn_and_wait, SpawnHandle};
