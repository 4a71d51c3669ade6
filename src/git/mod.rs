//! Git operations wrapper.
//!
//! This module provides an async wrapper around the system `git` command. Uses system Git
//! (not libgit2) for maximum compatibility with authentication, configurations, and platforms.
//!
//! # Core Features
//!
//! - **Async operations**: Non-blocking I/O using Tokio
//! - **Authentication**: HTTPS tokens, SSH keys, credential helpers
//! - **Cross-platform**: Windows, macOS, Linux support
//! - **Tag caching**: Per-instance caching for performance
//!
//! # Security
//!
//! - Command injection prevention via proper argument passing
//! - Credentials never logged or exposed in errors

pub mod command_builder;

use crate::git::command_builder::GitCommand;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// A Git repository handle providing async operations via CLI commands.
///
#[derive(Debug, Clone)]
pub struct GitRepo {
    /// The local filesystem path to the Git repository.
    ///
    /// This path should point to the root directory of a Git repository
    /// (the directory containing `.git/` subdirectory).
    path: PathBuf,

    /// Cached list of tags for performance optimization.
    ///
    /// Tags are cached after the first `list_tags()` call to avoid repeated
    /// `git tag -l` operations within a single command execution. This is
    /// particularly important for version constraint resolution where the same
    /// tag list may be queried hundreds of times.
    ///
    /// Uses Arc to enable sharing the cache across cloned instances, which is
    /// critical for parallel dependency resolution where multiple tasks access
    /// the same repository.
    tag_cache: std::sync::Arc<OnceLock<Vec<String>>>,
}

impl GitRepo {
    /// Creates a new `GitRepo` instance for an existing local repository.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path to the Git repository root directory
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            tag_cache: std::sync::Arc::new(OnceLock::new()),
        }
    }

    /// Clones a Git repository from a remote URL to a local path.
    ///
    /// # Arguments
    ///
    /// * `url` - The remote repository URL (HTTPS, SSH, or file://)
    /// * `target` - The local directory where the repository will be cloned
    /// * `progress` - Optional progress bar for user feedback
    ///
    /// # Errors
    ///
    /// - The URL is invalid or unreachable
    /// - Authentication fails
    /// - The target directory already exists and is not empty
    /// - Network connectivity issues
    /// - Insufficient disk space
    pub async fn clone(url: &str, target: impl AsRef<Path>) -> Result<Self> {
        let target_path = target.as_ref();

        // Use command builder for consistent clone operations
        let mut cmd = GitCommand::clone(url, target_path);

        // For file:// URLs, clone with all branches to ensure commit availability
        if url.starts_with("file://") {
            cmd = GitCommand::clone_local(url, target_path);
        }

        // Execute will handle error context properly
        cmd.execute().await?;

        Ok(Self::new(target_path))
    }

    /// Fetches updates from the remote repository without modifying the working tree.
    ///
    /// # Arguments
    ///
    /// * `auth_url` - Optional URL with authentication for private repositories
    /// * `progress` - Optional progress bar for network operation feedback
    ///
    /// # Errors
    ///
    /// - Network connectivity fails
    /// - Authentication is rejected
    /// - The remote repository is unavailable
    /// - The local repository is in an invalid state
    pub async fn fetch(&self, auth_url: Option<&str>) -> Result<()> {
        // Note: file:// URLs are local repositories, but we still need to fetch
        // from them to get updates from the source repository

        // Use git fetch with authentication from global config URL if provided
        if let Some(url) = auth_url {
            // Temporarily update the remote URL with auth for this fetch
            GitCommand::set_remote_url(url).current_dir(&self.path).execute_success().await?;
        }

        // Now fetch with the potentially updated URL
        GitCommand::fetch().current_dir(&self.path).execute_success().await?;

        Ok(())
    }

    /// Lists all tags in the repository, sorted by Git's default ordering.
    ///
    /// # Return Value
    ///
    /// # Errors
    ///
    /// - The repository path doesn't exist
    /// - The directory is not a valid Git repository
    /// - Git command execution fails
    /// - File system permissions prevent access
    /// - Lock conflicts persist after retry attempts
    pub async fn list_tags(&self) -> Result<Vec<String>> {
        if let Some(cached_tags) = self.tag_cache.get() {
            return Ok(cached_tags.clone());
        }

        if !self.path.exists() {
            return Err(anyhow::anyhow!("Repository path does not exist: {:?}", self.path));
        }
        if !self.path.join(".git").exists() && !self.path.join("HEAD").exists() {
            return Err(anyhow::anyhow!("Not a git repository: {:?}", self.path));
        }

        const MAX_RETRIES: u32 = 3;
        const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(150);
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            let result = GitCommand::list_tags().current_dir(&self.path).execute_stdout().await;

            match result {
                Ok(stdout) => {
                    let tags: Vec<String> = stdout
                        .lines()
                        .filter(|line| !line.is_empty())
                        .map(std::string::ToString::to_string)
                        .collect();
                    let _ = self.tag_cache.set(tags.clone());
                    return Ok(tags);
                }
                Err(e) => {
                    let error_str = e.to_string();
                    if error_str.contains("lock") {
                        last_error = Some(e);
                        tokio::time::sleep(RETRY_DELAY * (attempt + 1)).await; // Exponential backoff
                        continue;
                    }
                    // For non-lock errors, fail immediately
                    return Err(e).context(format!("Failed to list git tags in {:?}", self.path));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Exhausted retries for list_tags")))
            .context(format!(
                "Failed to list git tags in {:?} after {} retries",
                self.path, MAX_RETRIES
            ))
    }

    /// Retrieves the URL of the remote 'origin' repository.
    ///
    /// # Return Value
    ///
    /// - HTTPS: `https://github.com/user/repo.git`
    /// - SSH: `git@github.com:user/repo.git`
    /// - File: `file:///path/to/repo.git`
    ///
    /// # Errors
    ///
    /// - No 'origin' remote is configured
    /// - The repository is not a valid Git repository
    /// - Git command execution fails
    /// - File system access is denied
    pub async fn get_remote_url(&self) -> Result<String> {
        GitCommand::remote_url().current_dir(&self.path).execute_stdout().await
    }

    /// Resolves a Git reference (tag, branch, commit) to its full SHA-1 hash.
    ///
    /// # Arguments
    ///
    /// * `ref_spec` - The Git reference to resolve (tag, branch, short/full SHA, or None for HEAD)
    /// # Returns
    ///
    /// # Errors
    ///
    /// - The reference doesn't exist in the repository
    /// - The repository is invalid or corrupted
    /// - Git command execution fails
    pub async fn resolve_to_sha(&self, ref_spec: Option<&str>) -> Result<String> {
        let reference = ref_spec.unwrap_or("HEAD");

        // Optimization: if it's already a full SHA, return it directly
        if reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(reference.to_string());
        }

        // Determine the reference to resolve based on type (tag vs branch)
        let ref_to_resolve = if !reference.contains('/') && reference != "HEAD" {
            // Check if this is a tag (uses cached tag list for performance)
            let is_tag = self
                .list_tags()
                .await
                .map(|tags| tags.contains(&reference.to_string()))
                .unwrap_or(false);

            if is_tag {
                // It's a tag - use it directly
                reference.to_string()
            } else {
                // Assume it's a branch name - try to resolve origin/branch first to get the latest from remote
                // This ensures we get the most recent commit after a fetch
                let origin_ref = format!("origin/{reference}");
                if GitCommand::rev_parse(&origin_ref)
                    .current_dir(&self.path)
                    .execute_stdout()
                    .await
                    .is_ok()
                {
                    origin_ref
                } else {
                    // Fallback to the original reference (might be a local branch)
                    reference.to_string()
                }
            }
        } else {
            reference.to_string()
        };

        // Use rev-parse to get the full SHA
        let sha = GitCommand::rev_parse(&ref_to_resolve)
            .current_dir(&self.path)
            .execute_stdout()
            .await
            .with_context(|| format!("Failed to resolve reference '{reference}' to SHA"))?;

        // Ensure we have a full SHA (sometimes rev-parse can return short SHAs)
        if sha.len() < 40 {
            // Request the full SHA explicitly
            let full_sha = GitCommand::new()
                .args(["rev-parse", "--verify", &format!("{reference}^{{commit}}")])
                .current_dir(&self.path)
                .execute_stdout()
                .await
                .with_context(|| format!("Failed to get full SHA for reference '{reference}'"))?;
            Ok(full_sha)
        } else {
            Ok(sha)
        }
    }
}

/// Checks if a path contains a Git repository (regular or bare).
///
/// # Arguments
///
/// * `path` - The path to check for a Git repository
/// # Returns
///
/// * `true` if the path is a valid Git repository (regular or bare)
/// * `false` if neither repository marker exists
#[must_use]
pub fn is_git_repository(path: &Path) -> bool {
    // Check for regular repository (.git directory) or bare repository (HEAD file)
    path.join(".git").exists() || path.join("HEAD").exists()
}
