//! Dependency Retriever: the interface the resolver consults for remote data.
//!
//! Three capabilities: `versions_for` (all tag-like revisions a remote
//! exposes), `dependencies_for` (the manifest found inside a dependency at a
//! revision) and `resolve_git_ref` (resolve a branch/tag/SHA prefix to a
//! fixed commit). Results are cached for the lifetime of a resolver run:
//! `versions_for` per dependency, `dependencies_for` per `(dep, revision)`.

pub mod git_retriever;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::core::CoreError;
use crate::dependency::Dependency;
use crate::version::{ConcreteVersion, PinnedRevision, VersionSpec};

pub use git_retriever::GitRetriever;

/// The uncached source of truth: actual I/O against a dependency's remote.
/// Implemented by [`GitRetriever`] in terms of the [`crate::coordinator`].
#[async_trait]
pub trait RawRetriever: Send + Sync {
    async fn list_versions(&self, dep: &Dependency) -> Result<Vec<ConcreteVersion>, CoreError>;

    async fn read_manifest_at(
        &self,
        dep: &Dependency,
        rev: &PinnedRevision,
    ) -> Result<Vec<(Dependency, VersionSpec)>, CoreError>;

    async fn resolve_ref(
        &self,
        dep: &Dependency,
        reference: &str,
    ) -> Result<PinnedRevision, CoreError>;
}

/// The interface the resolver consults. See module docs.
#[async_trait]
pub trait DependencyRetriever: Send + Sync {
    async fn versions_for(&self, dep: &Dependency) -> Result<Arc<Vec<ConcreteVersion>>, CoreError>;

    async fn dependencies_for(
        &self,
        dep: &Dependency,
        rev: &PinnedRevision,
    ) -> Result<Arc<Vec<(Dependency, VersionSpec)>>, CoreError>;

    async fn resolve_git_ref(
        &self,
        dep: &Dependency,
        reference: &str,
    ) -> Result<PinnedRevision, CoreError>;
}

/// Wraps a [`RawRetriever`] with per-run memoization, matching §4.3's caching
/// requirement without requiring the raw retriever to know about caching.
pub struct CachingRetriever<R: RawRetriever> {
    raw: Arc<R>,
    versions_cache: DashMap<Dependency, Arc<Vec<ConcreteVersion>>>,
    deps_cache: DashMap<(Dependency, PinnedRevision), Arc<Vec<(Dependency, VersionSpec)>>>,
}

impl<R: RawRetriever> CachingRetriever<R> {
    #[must_use]
    pub fn new(raw: Arc<R>) -> Self {
        Self { raw, versions_cache: DashMap::new(), deps_cache: DashMap::new() }
    }
}

#[async_trait]
impl<R: RawRetriever> DependencyRetriever for CachingRetriever<R> {
    async fn versions_for(&self, dep: &Dependency) -> Result<Arc<Vec<ConcreteVersion>>, CoreError> {
        if let Some(cached) = self.versions_cache.get(dep) {
            return Ok(cached.clone());
        }
        let versions = self.raw.list_versions(dep).await?;
        let versions = Arc::new(versions);
        self.versions_cache.insert(dep.clone(), versions.clone());
        Ok(versions)
    }

    async fn dependencies_for(
        &self,
        dep: &Dependency,
        rev: &PinnedRevision,
    ) -> Result<Arc<Vec<(Dependency, VersionSpec)>>, CoreError> {
        let key = (dep.clone(), rev.clone());
        if let Some(cached) = self.deps_cache.get(&key) {
            return Ok(cached.clone());
        }
        let deps = self.raw.read_manifest_at(dep, rev).await?;
        let deps = Arc::new(deps);
        self.deps_cache.insert(key, deps.clone());
        Ok(deps)
    }

    async fn resolve_git_ref(
        &self,
        dep: &Dependency,
        reference: &str,
    ) -> Result<PinnedRevision, CoreError> {
        // Git ref resolution is not memoized beyond the underlying repository
        // state: two different refs may legitimately resolve differently
        // across calls only if the remote changed, which per §5 is not a
        // concern within a single resolver run.
        self.raw.resolve_ref(dep, reference).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRaw {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RawRetriever for CountingRaw {
        async fn list_versions(&self, _dep: &Dependency) -> Result<Vec<ConcreteVersion>, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ConcreteVersion::semantic("1.0.0", crate::version::SemVer::new(1, 0, 0))])
        }

        async fn read_manifest_at(
            &self,
            _dep: &Dependency,
            _rev: &PinnedRevision,
        ) -> Result<Vec<(Dependency, VersionSpec)>, CoreError> {
            Ok(Vec::new())
        }

        async fn resolve_ref(
            &self,
            _dep: &Dependency,
            reference: &str,
        ) -> Result<PinnedRevision, CoreError> {
            Ok(reference.to_string())
        }
    }

    #[tokio::test]
    async fn versions_for_is_memoized_per_dependency() {
        let raw = Arc::new(CountingRaw { calls: AtomicUsize::new(0) });
        let retriever = CachingRetriever::new(raw.clone());
        let dep = Dependency::parse_identity("o/A", "github");

        retriever.versions_for(&dep).await.unwrap();
        retriever.versions_for(&dep).await.unwrap();

        assert_eq!(raw.calls.load(Ordering::SeqCst), 1);
    }
}
