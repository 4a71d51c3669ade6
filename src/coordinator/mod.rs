//! Repository Coordinator: clone-or-fetch each dependency exactly once.
//!
//! Maintains `<cache_root>/dependencies/<dep_name>/` — one clone per
//! dependency. Operations across *different* dependencies may run in
//! parallel; operations within the same dependency path are serialized on a
//! per-dependency queue to avoid corrupting the on-disk clone. A global queue
//! guards directory creation of the cache root.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::{CoreError, Event, EventSink, NullSink};
use crate::dependency::Dependency;
use crate::git::command_builder::GitCommand;
use crate::git::GitRepo;
use crate::version::PinnedRevision;

/// Serializes operations per dependency and guards cache-root creation,
/// grounded on the lock-ordering discipline of a DashMap-keyed lock table but
/// simplified to one lock per dependency (the resolver never needs to hold
/// more than one dependency's lock at a time).
pub struct RepositoryCoordinator {
    cache_root: PathBuf,
    url_rewrites: Vec<(String, String)>,
    per_dep_locks: DashMap<String, Arc<Mutex<()>>>,
    cache_root_lock: Arc<Mutex<()>>,
    sink: Arc<dyn EventSink>,
}

impl RepositoryCoordinator {
    #[must_use]
    pub fn new(cache_root: PathBuf, url_rewrites: Vec<(String, String)>) -> Self {
        Self {
            cache_root,
            url_rewrites,
            per_dep_locks: DashMap::new(),
            cache_root_lock: Arc::new(Mutex::new(())),
            sink: Arc::new(NullSink),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    fn lock_for(&self, dep: &Dependency) -> Arc<Mutex<()>> {
        self.per_dep_locks.entry(dep.clone_dir_name()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn ensure_cache_root(&self) -> Result<(), CoreError> {
        let _guard = self.cache_root_lock.lock().await;
        let deps_dir = self.cache_root.join("dependencies");
        tokio::fs::create_dir_all(&deps_dir).await.map_err(|e| CoreError::WriteFailed {
            path: deps_dir,
            os_err: e.to_string(),
        })
    }

    /// Clone the dependency if absent, otherwise fetch updates. Returns the
    /// local clone path.
    pub async fn ensure_clone_or_fetch(&self, dep: &Dependency) -> Result<PathBuf, CoreError> {
        self.ensure_cache_root().await?;
        let lock = self.lock_for(dep);
        let _guard = lock.lock().await;

        let path = dep.clone_path(&self.cache_root);
        let url = dep.remote_url(&self.url_rewrites);

        if crate::git::is_git_repository(&path) {
            self.sink.emit(Event::Fetching(dep.name()));
            let repo = GitRepo::new(&path);
            repo.fetch(None).await.map_err(to_core_error)?;
        } else {
            self.sink.emit(Event::Cloning(dep.name()));
            GitRepo::clone(&url, &path).await.map_err(to_core_error)?;
        }
        Ok(path)
    }

    pub async fn list_tags(&self, dep: &Dependency) -> Result<Vec<PinnedRevision>, CoreError> {
        let path = self.ensure_clone_or_fetch(dep).await?;
        let lock = self.lock_for(dep);
        let _guard = lock.lock().await;
        let repo = GitRepo::new(&path);
        repo.list_tags().await.map_err(to_core_error)
    }

    pub async fn read_file_at(
        &self,
        dep: &Dependency,
        rev: &PinnedRevision,
        file_path: &str,
    ) -> Result<Vec<u8>, CoreError> {
        let path = self.ensure_clone_or_fetch(dep).await?;
        let lock = self.lock_for(dep);
        let _guard = lock.lock().await;
        let spec = format!("{rev}:{file_path}");
        let output = GitCommand::new()
            .args(["show", &spec])
            .current_dir(&path)
            .execute()
            .await
            .map_err(to_core_error)?;
        Ok(output.stdout.into_bytes())
    }

    pub async fn resolve_ref(
        &self,
        dep: &Dependency,
        reference: &str,
    ) -> Result<PinnedRevision, CoreError> {
        let path = self.ensure_clone_or_fetch(dep).await?;
        let lock = self.lock_for(dep);
        let _guard = lock.lock().await;
        let repo = GitRepo::new(&path);
        repo.resolve_to_sha(Some(reference)).await.map_err(to_core_error)
    }

    pub async fn commit_exists(&self, dep: &Dependency, rev: &PinnedRevision) -> bool {
        let path = dep.clone_path(&self.cache_root);
        if !crate::git::is_git_repository(&path) {
            return false;
        }
        let lock = self.lock_for(dep);
        let _guard = lock.lock().await;
        GitCommand::new()
            .args(["cat-file", "-e", rev])
            .current_dir(&path)
            .execute_success()
            .await
            .is_ok()
    }

    /// Export a revision to `working_dir` for building.
    pub async fn checkout_into(
        &self,
        dep: &Dependency,
        rev: &PinnedRevision,
        working_dir: &Path,
    ) -> Result<(), CoreError> {
        let repo_path = self.ensure_clone_or_fetch(dep).await?;
        let lock = self.lock_for(dep);
        let _guard = lock.lock().await;

        self.sink.emit(Event::CheckingOut(dep.name(), rev.clone()));
        crate::utils::fs::ensure_dir(working_dir).map_err(|e| CoreError::WriteFailed {
            path: working_dir.to_path_buf(),
            os_err: e.to_string(),
        })?;

        let archive_path = working_dir.with_extension("checkout.tar");
        GitCommand::new()
            .args(["archive", "--format=tar", "--output", &archive_path.display().to_string(), rev])
            .current_dir(&repo_path)
            .execute()
            .await
            .map_err(to_core_error)?;

        let result = crate::io::process::spawn_and_wait(
            "tar",
            &["-xf", &archive_path.display().to_string(), "-C", &working_dir.display().to_string()],
            None,
        )
        .await
        .map(|_| ());

        let _ = tokio::fs::remove_file(&archive_path).await;
        result
    }
}

fn to_core_error(err: anyhow::Error) -> CoreError {
    match err.downcast::<CoreError>() {
        Ok(core_err) => core_err,
        Err(err) => CoreError::Other { message: err.to_string() },
    }
}
