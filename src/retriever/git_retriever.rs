//! A [`super::RawRetriever`] backed by the [`crate::coordinator::RepositoryCoordinator`].

use async_trait::async_trait;
use std::sync::Arc;

use super::RawRetriever;
use crate::coordinator::RepositoryCoordinator;
use crate::core::CoreError;
use crate::dependency::Dependency;
use crate::manifest;
use crate::version::{parse_semver, ConcreteVersion, PinnedRevision, VersionSpec};

/// The manifest filename looked up inside a dependency's checked-out tree.
pub const MANIFEST_FILENAME: &str = "Dependencies";

pub struct GitRetriever {
    coordinator: Arc<RepositoryCoordinator>,
}

impl GitRetriever {
    #[must_use]
    pub fn new(coordinator: Arc<RepositoryCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl RawRetriever for GitRetriever {
    async fn list_versions(&self, dep: &Dependency) -> Result<Vec<ConcreteVersion>, CoreError> {
        let tags = self.coordinator.list_tags(dep).await?;
        if tags.is_empty() {
            return Err(CoreError::TaggedVersionNotFound { dep: dep.name() });
        }
        Ok(tags
            .into_iter()
            .map(|tag| match parse_semver(&tag) {
                Ok(semver) => ConcreteVersion::semantic(tag, semver),
                Err(_) => ConcreteVersion::non_semantic(tag),
            })
            .collect())
    }

    async fn read_manifest_at(
        &self,
        dep: &Dependency,
        rev: &PinnedRevision,
    ) -> Result<Vec<(Dependency, VersionSpec)>, CoreError> {
        let bytes = match self.coordinator.read_file_at(dep, rev, MANIFEST_FILENAME).await {
            Ok(bytes) => bytes,
            // A dependency with no nested manifest simply has no transitive
            // dependencies (see scenario A: `dependencies_for(A, 1.2.1)` is empty).
            Err(_) => return Ok(Vec::new()),
        };
        let text = String::from_utf8_lossy(&bytes);
        let entries = manifest::parse_manifest(&text)?;
        Ok(entries.into_iter().map(|e| (e.dependency, e.spec)).collect())
    }

    async fn resolve_ref(
        &self,
        dep: &Dependency,
        reference: &str,
    ) -> Result<PinnedRevision, CoreError> {
        self.coordinator.resolve_ref(dep, reference).await
    }
}
