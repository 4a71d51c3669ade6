//! `copy_tree` and subtree-skippable directory enumeration.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::CoreError;

/// Copy `src` to `dst` recursively, byte-wise. Some filesystems corrupt the
/// destination under copy-on-write clone semantics (e.g. reflinks onto a
/// volume that doesn't support them); this always does a plain recursive
/// byte copy rather than relying on any OS-level clone fast path.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<(), CoreError> {
    if src.is_dir() {
        std::fs::create_dir_all(dst)
            .map_err(|e| CoreError::WriteFailed { path: dst.to_path_buf(), os_err: e.to_string() })?;
        for entry in std::fs::read_dir(src)
            .map_err(|e| CoreError::ReadFailed { path: src.to_path_buf(), os_err: e.to_string() })?
        {
            let entry =
                entry.map_err(|e| CoreError::ReadFailed { path: src.to_path_buf(), os_err: e.to_string() })?;
            let dst_child = dst.join(entry.file_name());
            copy_tree(&entry.path(), &dst_child)?;
        }
        Ok(())
    } else {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::WriteFailed {
                path: parent.to_path_buf(),
                os_err: e.to_string(),
            })?;
        }
        std::fs::copy(src, dst)
            .map(|_| ())
            .map_err(|e| CoreError::WriteFailed { path: dst.to_path_buf(), os_err: e.to_string() })
    }
}

/// One entry from [`enumerate_dir`], carrying enough state for the caller to
/// skip its subtree mid-walk.
pub struct DirEntryHandle<'a> {
    pub path: PathBuf,
    pub is_dir: bool,
    iter: &'a mut walkdir::IntoIter,
}

impl DirEntryHandle<'_> {
    /// Skip descending into this entry's subtree (only meaningful when
    /// `is_dir` is true).
    pub fn skip_subtree(&mut self) {
        self.iter.skip_current_dir();
    }
}

/// Enumerate `root`, returning both the entry and the enumerator so callers
/// can call [`DirEntryHandle::skip_subtree`] mid-walk.
pub fn enumerate_dir(root: &Path, mut visit: impl FnMut(DirEntryHandle<'_>)) -> Result<(), CoreError> {
    let mut iter = WalkDir::new(root).into_iter();
    loop {
        let Some(entry) = iter.next() else { break };
        let entry = entry.map_err(|e| CoreError::ReadFailed {
            path: root.to_path_buf(),
            os_err: e.to_string(),
        })?;
        let handle = DirEntryHandle {
            path: entry.path().to_path_buf(),
            is_dir: entry.file_type().is_dir(),
            iter: &mut iter,
        };
        visit(handle);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copy_tree_copies_nested_files() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("a/b")).unwrap();
        std::fs::write(src.path().join("a/b/file.txt"), "hi").unwrap();

        copy_tree(src.path(), dst.path()).unwrap();

        assert_eq!(std::fs::read_to_string(dst.path().join("a/b/file.txt")).unwrap(), "hi");
    }

    #[test]
    fn enumerate_dir_can_skip_subtree() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("skip_me/nested")).unwrap();
        std::fs::write(root.path().join("skip_me/nested/file.txt"), "x").unwrap();
        std::fs::write(root.path().join("keep.txt"), "y").unwrap();

        let mut seen = Vec::new();
        enumerate_dir(root.path(), |mut entry| {
            if entry.path.file_name().and_then(|n| n.to_str()) == Some("skip_me") {
                entry.skip_subtree();
            }
            seen.push(entry.path.clone());
        })
        .unwrap();

        assert!(!seen.iter().any(|p| p.ends_with("nested/file.txt")));
        assert!(seen.iter().any(|p| p.ends_with("keep.txt")));
    }
}
