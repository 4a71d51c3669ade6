//! End-to-end coverage for the manifest/resolve/lockfile pipeline, the
//! build-cache version file, and the CLI wrapper, exercising the concrete
//! scenarios that the unit tests inside each module don't already cover.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use depcore::core::CoreError;
use depcore::dependency::Dependency;
use depcore::manifest::{self, ManifestEntry};
use depcore::resolver::resolve;
use depcore::retriever::DependencyRetriever;
use depcore::version::{parse_spec, ConcreteVersion, PinnedRevision, SemVer, VersionSpec};
use depcore::version_file::{create_version_file, matches, BuiltProduct};

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

fn gh(identity: &str) -> Dependency {
    Dependency::parse_identity(identity, "github")
}

fn sv(revision: &str, major: u64, minor: u64, patch: u64) -> ConcreteVersion {
    ConcreteVersion::semantic(revision, SemVer::new(major, minor, patch))
}

/// Scenario C: two manifest roots share a transitive dependency; both
/// requirements are satisfiable by the dependency's newest tag, so the
/// resolver converges on it rather than settling for the oldest common one.
#[tokio::test]
async fn shared_transitive_dependency_converges_on_latest_compatible() {
    let a = gh("o/A");
    let b = gh("o/B");
    let c = gh("o/C");

    let retriever = FakeRetriever {
        versions: HashMap::from([
            (a.clone(), vec![sv("1.0.0", 1, 0, 0)]),
            (b.clone(), vec![sv("1.0.0", 1, 0, 0)]),
            (c.clone(), vec![sv("1.0.0", 1, 0, 0), sv("1.1.0", 1, 1, 0)]),
        ]),
        deps: HashMap::from([
            (
                (a.clone(), "1.0.0".to_string()),
                vec![(c.clone(), VersionSpec::CompatibleWith(SemVer::new(1, 0, 0)))],
            ),
            (
                (b.clone(), "1.0.0".to_string()),
                vec![(c.clone(), VersionSpec::CompatibleWith(SemVer::new(1, 0, 0)))],
            ),
        ]),
    };
    let manifest = vec![
        ManifestEntry { kind: "github".into(), identity: "o/A".into(), dependency: a.clone(), spec: VersionSpec::CompatibleWith(SemVer::new(1, 0, 0)) },
        ManifestEntry { kind: "github".into(), identity: "o/B".into(), dependency: b.clone(), spec: VersionSpec::CompatibleWith(SemVer::new(1, 0, 0)) },
    ];

    let resolved = resolve(&manifest, &retriever, None, None).await.unwrap();

    assert_eq!(resolved.get(&c).map(String::as_str), Some("1.1.0"));
}

/// Scenario D: two manifest roots require incompatible ranges of the same
/// transitive dependency; no candidate satisfies both, so resolution fails
/// rather than silently picking one side.
#[tokio::test]
async fn shared_transitive_dependency_with_incompatible_ranges_fails_to_resolve() {
    let a = gh("o/A");
    let b = gh("o/B");
    let c = gh("o/C");

    let retriever = FakeRetriever {
        versions: HashMap::from([
            (a.clone(), vec![sv("1.0.0", 1, 0, 0)]),
            (b.clone(), vec![sv("1.0.0", 1, 0, 0)]),
            (c.clone(), vec![sv("1.0.0", 1, 0, 0), sv("1.1.0", 1, 1, 0), sv("2.0.0", 2, 0, 0)]),
        ]),
        deps: HashMap::from([
            (
                (a.clone(), "1.0.0".to_string()),
                vec![(c.clone(), VersionSpec::CompatibleWith(SemVer::new(1, 0, 0)))],
            ),
            (
                (b.clone(), "1.0.0".to_string()),
                vec![(c.clone(), VersionSpec::CompatibleWith(SemVer::new(2, 0, 0)))],
            ),
        ]),
    };
    let manifest = vec![
        ManifestEntry { kind: "github".into(), identity: "o/A".into(), dependency: a, spec: VersionSpec::CompatibleWith(SemVer::new(1, 0, 0)) },
        ManifestEntry { kind: "github".into(), identity: "o/B".into(), dependency: b, spec: VersionSpec::CompatibleWith(SemVer::new(1, 0, 0)) },
    ];

    let result = resolve(&manifest, &retriever, None, None).await;

    assert!(result.is_err());
}

/// The manifest text a user writes, once resolved, produces a lockfile that
/// parses back to the exact same identity/revision pairs.
#[tokio::test]
async fn manifest_text_resolves_and_round_trips_through_the_lockfile() {
    let text = "github \"o/A\" ~> 1.2\n";
    let entries = manifest::parse_manifest(text).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].spec, parse_spec("~> 1.2").unwrap());

    let a = gh("o/A");
    let retriever = FakeRetriever {
        versions: HashMap::from([(
            a.clone(),
            vec![sv("1.1.0", 1, 1, 0), sv("1.2.0", 1, 2, 0), sv("1.2.1", 1, 2, 1), sv("2.0.0", 2, 0, 0)],
        )]),
        deps: HashMap::new(),
    };

    let resolved = resolve(&entries, &retriever, None, None).await.unwrap();
    let lock_entries: Vec<_> = entries
        .iter()
        .filter_map(|entry| {
            resolved.get(&entry.dependency).map(|revision| depcore::manifest::LockEntry {
                kind: entry.kind.clone(),
                identity: entry.identity.clone(),
                revision: revision.clone(),
            })
        })
        .collect();

    let lockfile_text = manifest::format_lockfile(&lock_entries);
    let reparsed = manifest::parse_lockfile(&lockfile_text).unwrap();

    assert_eq!(reparsed.len(), 1);
    assert_eq!(reparsed[0].identity, "o/A");
    assert_eq!(reparsed[0].revision, "1.2.1");
}

/// Scenario E: a version file certifies a build until one of its recorded
/// products disappears from disk, and recreating the build restores it.
#[tokio::test]
async fn version_file_detects_a_missing_product_and_recovers_after_rebuild() {
    let build_root = tempfile::tempdir().unwrap();
    let platform_dir = build_root.path().join("iOS");
    std::fs::create_dir_all(&platform_dir).unwrap();
    let product_path = platform_dir.join("Foo");
    std::fs::write(&product_path, b"binary-contents").unwrap();

    let built = vec![BuiltProduct { platform: "iOS".to_string(), path: product_path.clone() }];
    create_version_file("Foo", "abc123", &built, build_root.path()).await.unwrap();

    let platforms = vec!["iOS".to_string()];
    assert_eq!(matches("Foo", "abc123", &platforms, build_root.path(), None).await, Some(true));

    std::fs::remove_file(&product_path).unwrap();
    assert_eq!(matches("Foo", "abc123", &platforms, build_root.path(), None).await, Some(false));

    std::fs::write(&product_path, b"binary-contents").unwrap();
    create_version_file("Foo", "abc123", &built, build_root.path()).await.unwrap();
    assert_eq!(matches("Foo", "abc123", &platforms, build_root.path(), None).await, Some(true));
}

/// A version file for a different commitish is immediately stale, without
/// needing to touch any product on disk.
#[tokio::test]
async fn version_file_with_different_commitish_is_stale() {
    let build_root = tempfile::tempdir().unwrap();
    create_version_file("Foo", "abc123", &[], build_root.path()).await.unwrap();

    assert_eq!(matches("Foo", "def456", &[], build_root.path(), None).await, Some(false));
    assert_eq!(matches("Foo", "abc123", &[], build_root.path(), None).await, Some(true));
}

/// No version file at all is "never built", distinct from "stale".
#[tokio::test]
async fn missing_version_file_is_none() {
    let build_root = tempfile::tempdir().unwrap();
    assert_eq!(matches("Foo", "abc123", &[], build_root.path(), None).await, None);
}

/// The CLI binary parses arguments and reports its own usage, the cheapest
/// possible proof that `main.rs`'s wiring to `cli::Cli` actually builds.
#[test]
fn cli_binary_prints_usage_on_help() {
    let mut cmd = assert_cmd::Command::cargo_bin("depcore").unwrap();
    cmd.arg("--help");
    cmd.assert().success().stdout(predicates::str::contains("Resolve, fetch and build"));
}

/// Resolve fails loudly with exit code 1 when the manifest can't be read at
/// all, matching the documented resolution-failure exit code.
#[test]
fn cli_resolve_exits_with_code_one_when_manifest_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = assert_cmd::Command::cargo_bin("depcore").unwrap();
    cmd.current_dir(dir.path()).arg("resolve");
    cmd.assert().code(1);
}
