//! An ordered container of candidate versions for one dependency.
//!
//! Kept sorted by [`ConcreteVersion`]'s ordering at all times, so `insert`
//! and `contains` are binary searches. `retain_compatible_with` narrows the
//! set down to those admitted by a [`VersionSpec`]; for `Any`/`GitRef` it is
//! a no-op since both admit everything already in the set.

use crate::version::{is_satisfied_by, ConcreteVersion, VersionSpec};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedVersionSet {
    versions: Vec<ConcreteVersion>,
}

impl SortedVersionSet {
    #[must_use]
    pub fn new() -> Self {
        Self { versions: Vec::new() }
    }

    #[must_use]
    pub fn from_unsorted(mut versions: Vec<ConcreteVersion>) -> Self {
        versions.sort();
        versions.dedup();
        Self { versions }
    }

    pub fn insert(&mut self, version: ConcreteVersion) {
        match self.versions.binary_search(&version) {
            Ok(_) => {}
            Err(idx) => self.versions.insert(idx, version),
        }
    }

    pub fn remove(&mut self, version: &ConcreteVersion) -> bool {
        match self.versions.binary_search(version) {
            Ok(idx) => {
                self.versions.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn contains(&self, version: &ConcreteVersion) -> bool {
        self.versions.binary_search(version).is_ok()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// The current best pick: the head of the ordered set.
    #[must_use]
    pub fn head(&self) -> Option<&ConcreteVersion> {
        self.versions.first()
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = &ConcreteVersion> {
        self.versions.iter()
    }

    /// Narrow the set to versions admitted by `spec`. `Any`/`GitRef` admit
    /// everything already present, so those are no-ops; other variants are
    /// bounded ranges over the sorted semantic prefix, located by
    /// `partition_point` and then filtered for the pre-release edge case.
    pub fn retain_compatible_with(&mut self, spec: &VersionSpec) {
        if matches!(spec, VersionSpec::Any | VersionSpec::GitRef(_)) {
            return;
        }
        // Semantic versions sort before non-semantic ones (see ConcreteVersion's
        // Ord), so the semantic prefix is a contiguous, binary-searchable range.
        let semantic_len = self.versions.partition_point(|c| c.semver.is_some());
        let mut kept = Vec::with_capacity(self.versions.len());
        for (idx, version) in self.versions.iter().enumerate() {
            let keep = if idx < semantic_len {
                is_satisfied_by(spec, version)
            } else {
                // Non-semantic (branch-like) candidates are retained regardless
                // of numeric bounds as fallbacks, except under Exactly.
                !matches!(spec, VersionSpec::Exactly(_))
            };
            if keep {
                kept.push(version.clone());
            }
        }
        self.versions = kept;
    }

    /// Commit to exactly one candidate, discarding the rest of the set.
    pub fn retain_only(&mut self, chosen: &ConcreteVersion) {
        self.versions.retain(|v| v == chosen);
    }

    /// Advance past the current head, e.g. after a branch using it was rejected.
    pub fn pop_head(&mut self) -> Option<ConcreteVersion> {
        if self.versions.is_empty() {
            None
        } else {
            Some(self.versions.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::SemVer;

    fn sv(revision: &str, major: u64, minor: u64, patch: u64) -> ConcreteVersion {
        ConcreteVersion::semantic(revision, SemVer::new(major, minor, patch))
    }

    #[test]
    fn head_is_newest_semantic_version() {
        let set = SortedVersionSet::from_unsorted(vec![
            sv("1.0.0", 1, 0, 0),
            sv("1.2.0", 1, 2, 0),
            sv("1.1.0", 1, 1, 0),
        ]);
        assert_eq!(set.head().unwrap().revision, "1.2.0");
    }

    #[test]
    fn semantic_sorts_before_non_semantic() {
        let set = SortedVersionSet::from_unsorted(vec![
            ConcreteVersion::non_semantic("main"),
            sv("1.0.0", 1, 0, 0),
        ]);
        assert_eq!(set.head().unwrap().revision, "1.0.0");
    }

    #[test]
    fn non_semantic_ordered_lexicographically() {
        let set = SortedVersionSet::from_unsorted(vec![
            ConcreteVersion::non_semantic("feature/b"),
            ConcreteVersion::non_semantic("feature/a"),
        ]);
        let revs: Vec<_> = set.iter().map(|c| c.revision.as_str()).collect();
        assert_eq!(revs, vec!["feature/a", "feature/b"]);
    }

    #[test]
    fn retain_compatible_with_any_is_identity() {
        let mut set = SortedVersionSet::from_unsorted(vec![
            sv("1.0.0", 1, 0, 0),
            ConcreteVersion::non_semantic("main"),
        ]);
        let before = set.clone();
        set.retain_compatible_with(&VersionSpec::Any);
        assert_eq!(set, before);
    }

    #[test]
    fn retain_compatible_with_narrows_caret_range() {
        let mut set = SortedVersionSet::from_unsorted(vec![
            sv("1.0.0", 1, 0, 0),
            sv("1.9.9", 1, 9, 9),
            sv("2.0.0", 2, 0, 0),
        ]);
        set.retain_compatible_with(&VersionSpec::CompatibleWith(SemVer::new(1, 2, 3)));
        let revs: Vec<_> = set.iter().map(|c| c.revision.clone()).collect();
        assert_eq!(revs, vec!["1.9.9".to_string()]);
    }

    #[test]
    fn retain_only_commits_single_candidate() {
        let mut set =
            SortedVersionSet::from_unsorted(vec![sv("1.0.0", 1, 0, 0), sv("1.1.0", 1, 1, 0)]);
        let chosen = sv("1.0.0", 1, 0, 0);
        set.retain_only(&chosen);
        assert_eq!(set.len(), 1);
        assert_eq!(set.head().unwrap().revision, "1.0.0");
    }
}
