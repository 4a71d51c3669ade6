//! The backtracking dependency resolver.
//!
//! Builds a [`DependencySet`] from the manifest's root requirements, then
//! performs a depth-first search over candidate versions: each dependency's
//! candidates are tried newest-semantic-first, then lexicographically among
//! non-semantic revisions. Accepting a candidate fetches its transitive
//! dependencies and folds each one's spec into the set via
//! [`crate::version::intersection`]; an empty candidate set or an
//! incompatible intersection rejects the branch and the search backtracks to
//! the next candidate. Only when every branch from the root is exhausted
//! does the conflict surface to the caller.
//!
//! A previously resolved lockfile pins every dependency not named in
//! `deps_to_update` to its prior revision, as long as that revision is still
//! admitted once its requirements are folded in — whether that dependency is
//! a manifest root or only reachable transitively, since the pin is applied
//! the moment a dependency's candidate set is first populated, not just for
//! the manifest's direct entries.

pub mod graph;

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;

use crate::core::CoreError;
use crate::dependency::Dependency;
use crate::manifest::ManifestEntry;
use crate::retriever::DependencyRetriever;
use crate::version::{intersection, parse_semver, ConcreteVersion, PinnedRevision, SortedVersionSet, VersionSpec};

#[derive(Clone, Default)]
struct DependencySet {
    unresolved: BTreeSet<Dependency>,
    resolved: BTreeMap<Dependency, PinnedRevision>,
    candidates: BTreeMap<Dependency, SortedVersionSet>,
    specs: BTreeMap<Dependency, VersionSpec>,
}

impl DependencySet {
    fn next_unresolved(&self) -> Option<Dependency> {
        self.unresolved.iter().next().cloned()
    }
}

/// The prior lockfile and the set of dependencies exempted from it, threaded
/// through the whole search so a transitive dependency's pin is applied the
/// same way a manifest root's is.
struct PinContext<'a> {
    last_resolved: Option<&'a BTreeMap<Dependency, PinnedRevision>>,
    deps_to_update: Option<&'a BTreeSet<Dependency>>,
}

impl PinContext<'_> {
    fn pinned_revision(&self, dep: &Dependency) -> Option<&PinnedRevision> {
        if self.deps_to_update.is_some_and(|u| u.contains(dep)) {
            return None;
        }
        self.last_resolved?.get(dep)
    }
}

/// Resolve `manifest` against `retriever`. `last_resolved` is the prior
/// lockfile, if any; dependencies named in `deps_to_update` are re-resolved
/// from scratch rather than pinned to their prior revision.
pub async fn resolve(
    manifest: &[ManifestEntry],
    retriever: &dyn DependencyRetriever,
    last_resolved: Option<&BTreeMap<Dependency, PinnedRevision>>,
    deps_to_update: Option<&BTreeSet<Dependency>>,
) -> Result<BTreeMap<Dependency, PinnedRevision>, CoreError> {
    let mut set = DependencySet::default();
    let pin_ctx = PinContext { last_resolved, deps_to_update };

    for entry in manifest {
        add_requirement(&mut set, retriever, &entry.dependency, &entry.spec, &pin_ctx).await?;
    }

    let set = backtrack(retriever, set, &pin_ctx).await?;
    Ok(set.resolved)
}

/// Populate or narrow `dep`'s candidate set for a newly encountered
/// requirement, unifying with any spec already recorded for `dep`. The first
/// time a dependency's candidates are populated, its prior lockfile pin (if
/// any and if still admitted) narrows the set immediately.
async fn add_requirement(
    set: &mut DependencySet,
    retriever: &dyn DependencyRetriever,
    dep: &Dependency,
    spec: &VersionSpec,
    pin_ctx: &PinContext<'_>,
) -> Result<(), CoreError> {
    if set.resolved.contains_key(dep) {
        return Ok(());
    }

    match set.specs.get(dep).cloned() {
        None => {
            let mut candidates = populate_candidates(retriever, dep, spec).await?;
            if candidates.is_empty() {
                return Err(CoreError::required_not_found(dep.name(), spec));
            }
            if let Some(revision) = pin_ctx.pinned_revision(dep) {
                let pinned = candidates.iter().find(|c| &c.revision == revision).cloned();
                if let Some(pinned) = pinned {
                    candidates.retain_only(&pinned);
                }
            }
            set.specs.insert(dep.clone(), spec.clone());
            set.candidates.insert(dep.clone(), candidates);
            set.unresolved.insert(dep.clone());
        }
        Some(existing_spec) => {
            let merged = unify(&existing_spec, spec, retriever, dep).await?;
            let candidates = set.candidates.get_mut(dep).expect("a recorded spec always has candidates");
            candidates.retain_compatible_with(&merged);
            if candidates.is_empty() {
                return Err(CoreError::required_not_found(dep.name(), &merged));
            }
            set.specs.insert(dep.clone(), merged);
        }
    }
    Ok(())
}

/// Merge two specs seen for the same dependency. Two `GitRef`s unify when
/// they resolve to the same commit even if their ref text differs; every
/// other combination goes through [`intersection`].
async fn unify(
    existing: &VersionSpec,
    incoming: &VersionSpec,
    retriever: &dyn DependencyRetriever,
    dep: &Dependency,
) -> Result<VersionSpec, CoreError> {
    if let (VersionSpec::GitRef(a), VersionSpec::GitRef(b)) = (existing, incoming) {
        if a == b {
            return Ok(existing.clone());
        }
        let rev_a = retriever.resolve_git_ref(dep, a).await?;
        let rev_b = retriever.resolve_git_ref(dep, b).await?;
        return if rev_a == rev_b {
            Ok(existing.clone())
        } else {
            Err(CoreError::incompatible(dep.name(), existing, incoming))
        };
    }
    intersection(existing, incoming).ok_or_else(|| CoreError::incompatible(dep.name(), existing, incoming))
}

async fn populate_candidates(
    retriever: &dyn DependencyRetriever,
    dep: &Dependency,
    spec: &VersionSpec,
) -> Result<SortedVersionSet, CoreError> {
    if let VersionSpec::GitRef(reference) = spec {
        let revision = retriever.resolve_git_ref(dep, reference).await?;
        let version = match parse_semver(&revision) {
            Ok(semver) => ConcreteVersion::semantic(revision, semver),
            Err(_) => ConcreteVersion::non_semantic(revision),
        };
        let mut set = SortedVersionSet::new();
        set.insert(version);
        Ok(set)
    } else {
        let versions = retriever.versions_for(dep).await?;
        let mut set = SortedVersionSet::from_unsorted((*versions).clone());
        set.retain_compatible_with(spec);
        Ok(set)
    }
}

/// Depth-first search: commit `dep` to each of its candidates in order,
/// folding in that candidate's transitive requirements, and recurse. Returns
/// the first fully-resolved set found; if every candidate for `dep` fails,
/// returns the last failure seen so the caller gets a meaningful error
/// instead of a generic "no solution".
fn backtrack<'a>(
    retriever: &'a dyn DependencyRetriever,
    set: DependencySet,
    pin_ctx: &'a PinContext<'a>,
) -> Pin<Box<dyn Future<Output = Result<DependencySet, CoreError>> + 'a>> {
    Box::pin(async move {
        let Some(dep) = set.next_unresolved() else {
            return Ok(set);
        };

        let candidates = set.candidates.get(&dep).cloned().unwrap_or_default();
        let mut last_err: Option<CoreError> = None;

        for candidate in candidates.iter() {
            let mut child = set.clone();
            child.unresolved.remove(&dep);
            child.resolved.insert(dep.clone(), candidate.revision.clone());
            if let Some(narrowed) = child.candidates.get_mut(&dep) {
                narrowed.retain_only(candidate);
            }

            let transitive = match retriever.dependencies_for(&dep, &candidate.revision).await {
                Ok(deps) => deps,
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };

            let mut rejected = None;
            for (trans_dep, trans_spec) in transitive.iter() {
                if let Err(e) = add_requirement(&mut child, retriever, trans_dep, trans_spec, pin_ctx).await {
                    rejected = Some(e);
                    break;
                }
            }
            if let Some(e) = rejected {
                last_err = Some(e);
                continue;
            }

            match backtrack(retriever, child, pin_ctx).await {
                Ok(resolved) => return Ok(resolved),
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CoreError::UnresolvedDependencies(vec![dep.name()])))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::version::SemVer;

    struct FakeRetriever {
        versions: HashMap<Dependency, Vec<ConcreteVersion>>,
        deps: HashMap<(Dependency, PinnedRevision), Vec<(Dependency, VersionSpec)>>,
    }

    #[async_trait]
    impl DependencyRetriever for FakeRetriever {
        async fn versions_for(&self, dep: &Dependency) -> Result<Arc<Vec<ConcreteVersion>>, CoreError> {
            Ok(Arc::new(self.versions.get(dep).cloned().unwrap_or_default()))
        }

        async fn dependencies_for(
            &self,
            dep: &Dependency,
            rev: &PinnedRevision,
        ) -> Result<Arc<Vec<(Dependency, VersionSpec)>>, CoreError> {
            Ok(Arc::new(self.deps.get(&(dep.clone(), rev.clone())).cloned().unwrap_or_default()))
        }

        async fn resolve_git_ref(&self, _dep: &Dependency, reference: &str) -> Result<PinnedRevision, CoreError> {
            Ok(reference.to_string())
        }
    }

    fn dep(name: &str) -> Dependency {
        Dependency::parse_identity(name, "github")
    }

    fn sv(revision: &str, major: u64, minor: u64, patch: u64) -> ConcreteVersion {
        ConcreteVersion::semantic(revision, SemVer::new(major, minor, patch))
    }

    fn entry(dep: Dependency, spec: VersionSpec) -> ManifestEntry {
        ManifestEntry { kind: "github".into(), identity: dep.name(), dependency: dep, spec }
    }

    /// Scenario A: a leaf dependency with no nested manifest resolves
    /// straight to its newest tag admitted by the root spec.
    #[tokio::test]
    async fn resolves_leaf_dependency_to_newest_admitted_tag() {
        let a = dep("o/A");
        let retriever = FakeRetriever {
            versions: HashMap::from([(
                a.clone(),
                vec![sv("1.1.0", 1, 1, 0), sv("1.2.0", 1, 2, 0), sv("1.2.1", 1, 2, 1), sv("2.0.0", 2, 0, 0)],
            )]),
            deps: HashMap::new(),
        };
        let manifest = vec![entry(a.clone(), VersionSpec::CompatibleWith(SemVer::new(1, 2, 0)))];

        let resolved = resolve(&manifest, &retriever, None, None).await.unwrap();

        assert_eq!(resolved.get(&a).map(String::as_str), Some("1.2.1"));
    }

    /// Scenario B: A's newest version pulls in a B that conflicts with the
    /// manifest's own B requirement, forcing a backtrack to an older A.
    #[tokio::test]
    async fn backtracks_past_a_transitive_conflict() {
        let a = dep("o/A");
        let b = dep("o/B");

        let retriever = FakeRetriever {
            versions: HashMap::from([
                (a.clone(), vec![sv("1.0.0", 1, 0, 0), sv("1.1.0", 1, 1, 0)]),
                (b.clone(), vec![sv("1.0.0", 1, 0, 0), sv("2.0.0", 2, 0, 0)]),
            ]),
            deps: HashMap::from([
                (
                    (a.clone(), "1.1.0".to_string()),
                    vec![(b.clone(), VersionSpec::CompatibleWith(SemVer::new(2, 0, 0)))],
                ),
                (
                    (a.clone(), "1.0.0".to_string()),
                    vec![(b.clone(), VersionSpec::CompatibleWith(SemVer::new(1, 0, 0)))],
                ),
            ]),
        };

        let manifest = vec![
            entry(a.clone(), VersionSpec::AtLeast(SemVer::new(1, 0, 0))),
            entry(b.clone(), VersionSpec::CompatibleWith(SemVer::new(1, 0, 0))),
        ];

        let resolved = resolve(&manifest, &retriever, None, None).await.unwrap();

        assert_eq!(resolved.get(&a).map(String::as_str), Some("1.0.0"));
        assert_eq!(resolved.get(&b).map(String::as_str), Some("1.0.0"));
    }

    /// When no candidate satisfies every requirement, the root requirement's
    /// conflict surfaces rather than an internal panic.
    #[tokio::test]
    async fn surfaces_conflict_when_every_branch_fails() {
        let a = dep("o/A");
        let retriever = FakeRetriever {
            versions: HashMap::from([(a.clone(), vec![sv("1.0.0", 1, 0, 0)])]),
            deps: HashMap::new(),
        };
        let manifest = vec![
            entry(a.clone(), VersionSpec::Exactly(SemVer::new(1, 0, 0))),
            entry(a.clone(), VersionSpec::Exactly(SemVer::new(2, 0, 0))),
        ];

        let result = resolve(&manifest, &retriever, None, None).await;

        assert!(result.is_err());
    }

    /// A lockfile pins unchanged dependencies to their prior revision even
    /// when a newer one would otherwise be preferred.
    #[tokio::test]
    async fn lockfile_pins_unchanged_dependency_to_prior_revision() {
        let a = dep("o/A");
        let retriever = FakeRetriever {
            versions: HashMap::from([(a.clone(), vec![sv("1.0.0", 1, 0, 0), sv("1.1.0", 1, 1, 0)])]),
            deps: HashMap::new(),
        };
        let manifest = vec![entry(a.clone(), VersionSpec::AtLeast(SemVer::new(1, 0, 0)))];
        let last_resolved = BTreeMap::from([(a.clone(), "1.0.0".to_string())]);

        let resolved = resolve(&manifest, &retriever, Some(&last_resolved), None).await.unwrap();

        assert_eq!(resolved.get(&a).map(String::as_str), Some("1.0.0"));
    }

    /// A lockfile pin is honored for a transitive dependency too, not only
    /// for dependencies named directly in the manifest.
    #[tokio::test]
    async fn lockfile_pins_transitive_dependency_to_prior_revision() {
        let a = dep("o/A");
        let b = dep("o/B");

        let retriever = FakeRetriever {
            versions: HashMap::from([
                (a.clone(), vec![sv("1.0.0", 1, 0, 0)]),
                (b.clone(), vec![sv("1.0.0", 1, 0, 0), sv("1.1.0", 1, 1, 0)]),
            ]),
            deps: HashMap::from([(
                (a.clone(), "1.0.0".to_string()),
                vec![(b.clone(), VersionSpec::CompatibleWith(SemVer::new(1, 0, 0)))],
            )]),
        };
        let manifest = vec![entry(a.clone(), VersionSpec::CompatibleWith(SemVer::new(1, 0, 0)))];
        let last_resolved =
            BTreeMap::from([(a.clone(), "1.0.0".to_string()), (b.clone(), "1.0.0".to_string())]);

        let resolved = resolve(&manifest, &retriever, Some(&last_resolved), None).await.unwrap();

        assert_eq!(resolved.get(&b).map(String::as_str), Some("1.0.0"));
    }

    /// Naming a dependency in `deps_to_update` drops its lockfile pin.
    #[tokio::test]
    async fn deps_to_update_overrides_the_lockfile_pin() {
        let a = dep("o/A");
        let retriever = FakeRetriever {
            versions: HashMap::from([(a.clone(), vec![sv("1.0.0", 1, 0, 0), sv("1.1.0", 1, 1, 0)])]),
            deps: HashMap::new(),
        };
        let manifest = vec![entry(a.clone(), VersionSpec::AtLeast(SemVer::new(1, 0, 0)))];
        let last_resolved = BTreeMap::from([(a.clone(), "1.0.0".to_string())]);
        let to_update = BTreeSet::from([a.clone()]);

        let resolved = resolve(&manifest, &retriever, Some(&last_resolved), Some(&to_update)).await.unwrap();

        assert_eq!(resolved.get(&a).map(String::as_str), Some("1.1.0"));
    }
}
