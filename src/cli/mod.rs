//! Thin command-line wrapper over the resolve/fetch/build pipeline.
//!
//! Exit codes: 0 success, 1 resolution failure, 2 build failure, 3 I/O or
//! network failure.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::binary_fetcher;
use crate::build::{self, BuildConfig};
use crate::config::Config;
use crate::coordinator::RepositoryCoordinator;
use crate::core::{CoreError, Event, EventSink};
use crate::manifest::{self, LockEntry, ManifestEntry};
use crate::retriever::{CachingRetriever, GitRetriever};

#[derive(Debug, Parser)]
#[command(name = "depcore", about = "Resolve, fetch and build pinned dependencies", version)]
pub struct Cli {
    /// Path to the manifest file.
    #[arg(long, global = true, default_value = "Dependencies")]
    pub manifest: PathBuf,

    /// Path to the lockfile.
    #[arg(long, global = true, default_value = "Dependencies.lock")]
    pub lockfile: PathBuf,

    /// Increase log verbosity.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve the manifest against its remotes and write the lockfile.
    Resolve {
        /// Re-resolve only these identities from scratch; others stay pinned.
        #[arg(long = "update")]
        update: Vec<String>,
    },
    /// Materialize every locked dependency: binary first, source fallback.
    Fetch,
    /// Build every fetched dependency's buildable schemes.
    Build {
        #[arg(long)]
        platform: Vec<String>,
    },
}

/// A sink that prints each event to stdout as it arrives.
struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, event: Event) {
        println!("{event}");
    }
}

impl Cli {
    pub async fn run(self) -> Result<(), ExitFailure> {
        let config = Config::load().map_err(ExitFailure::io)?;
        let sink: Arc<dyn EventSink> = Arc::new(StdoutSink);

        match &self.command {
            Command::Resolve { update } => self.run_resolve(&config, update, &sink).await,
            Command::Fetch => self.run_fetch(&config, &sink).await,
            Command::Build { platform } => self.run_build(&config, platform, &sink).await,
        }
    }

    fn read_manifest(&self) -> Result<Vec<ManifestEntry>, ExitFailure> {
        let text = std::fs::read_to_string(&self.manifest)
            .map_err(|e| ExitFailure::io(CoreError::ReadFailed { path: self.manifest.clone(), os_err: e.to_string() }))?;
        manifest::parse_manifest(&text).map_err(ExitFailure::resolution)
    }

    fn read_lockfile(&self) -> Option<Vec<LockEntry>> {
        let text = std::fs::read_to_string(&self.lockfile).ok()?;
        manifest::parse_lockfile(&text).ok()
    }

    async fn run_resolve(
        &self,
        config: &Config,
        update: &[String],
        sink: &Arc<dyn EventSink>,
    ) -> Result<(), ExitFailure> {
        let entries = self.read_manifest()?;
        let coordinator = Arc::new(
            RepositoryCoordinator::new(config.cache_root.clone(), config.url_rewrites.clone())
                .with_sink(sink.clone()),
        );
        let retriever = CachingRetriever::new(Arc::new(GitRetriever::new(coordinator)));

        let last_resolved = self.read_lockfile().map(|entries| {
            entries
                .into_iter()
                .map(|e| (crate::dependency::Dependency::parse_identity(&e.identity, &e.kind), e.revision))
                .collect::<BTreeMap<_, _>>()
        });
        let deps_to_update: BTreeSet<_> = update
            .iter()
            .map(|identity| crate::dependency::Dependency::parse_identity(identity, "github"))
            .collect();
        let deps_to_update = if deps_to_update.is_empty() { None } else { Some(&deps_to_update) };

        let resolved = crate::resolver::resolve(&entries, &retriever, last_resolved.as_ref(), deps_to_update)
            .await
            .map_err(ExitFailure::resolution)?;

        let lock_entries: Vec<LockEntry> = entries
            .iter()
            .filter_map(|entry| {
                resolved.get(&entry.dependency).map(|revision| LockEntry {
                    kind: entry.kind.clone(),
                    identity: entry.identity.clone(),
                    revision: revision.clone(),
                })
            })
            .collect();
        std::fs::write(&self.lockfile, manifest::format_lockfile(&lock_entries))
            .map_err(|e| ExitFailure::io(CoreError::WriteFailed { path: self.lockfile.clone(), os_err: e.to_string() }))?;
        sink.emit(Event::Completed);
        Ok(())
    }

    async fn run_fetch(&self, config: &Config, sink: &Arc<dyn EventSink>) -> Result<(), ExitFailure> {
        let locked = self.read_lockfile().ok_or_else(|| {
            ExitFailure::io(CoreError::ReadFailed { path: self.lockfile.clone(), os_err: "no lockfile; run resolve first".into() })
        })?;
        let coordinator = Arc::new(
            RepositoryCoordinator::new(config.cache_root.clone(), config.url_rewrites.clone())
                .with_sink(sink.clone()),
        );
        let client = reqwest::Client::new();

        for entry in &locked {
            let dep = crate::dependency::Dependency::parse_identity(&entry.identity, &entry.kind);
            let checkout_dir = config.cache_root.join("checkouts").join(dep.clone_dir_name());

            let auth_token = config.auth_token_for("github.com");
            let outcome = binary_fetcher::fetch_binaries(
                &client,
                &config.cache_root,
                &dep,
                &entry.revision,
                &checkout_dir,
                auth_token,
            )
            .await
            .map_err(ExitFailure::io)?;

            match outcome {
                binary_fetcher::Outcome::Fetched { tag, .. } => {
                    sink.emit(Event::DownloadingBinaries(dep.name(), tag));
                }
                binary_fetcher::Outcome::Skipped { reason } => {
                    sink.emit(Event::SkippedDownloadingBinaries(dep.name(), reason));
                    coordinator
                        .checkout_into(&dep, &entry.revision, &checkout_dir)
                        .await
                        .map_err(ExitFailure::io)?;
                }
            }
        }
        sink.emit(Event::Completed);
        Ok(())
    }

    async fn run_build(&self, config: &Config, platforms: &[String], sink: &Arc<dyn EventSink>) -> Result<(), ExitFailure> {
        let locked = self.read_lockfile().ok_or_else(|| {
            ExitFailure::io(CoreError::ReadFailed { path: self.lockfile.clone(), os_err: "no lockfile; run resolve first".into() })
        })?;
        let platforms = if platforms.is_empty() { config.default_platforms.clone() } else { platforms.to_vec() };
        let build_config = BuildConfig {
            build_tool: config.build_tool.clone(),
            bitcode_enabled: false,
            code_sign_identity: None,
        };

        for entry in &locked {
            let dep = crate::dependency::Dependency::parse_identity(&entry.identity, &entry.kind);
            let checkout_dir = config.cache_root.join("checkouts").join(dep.clone_dir_name());
            let build_root = config.cache_root.join("build").join(dep.clone_dir_name());

            build::build_dependency(
                &dep.name(),
                &checkout_dir,
                &platforms,
                &build_root,
                &entry.revision,
                config.toolchain_version_override.as_deref(),
                &build_config,
                sink.as_ref(),
            )
            .await
            .map_err(ExitFailure::build)?;
        }
        sink.emit(Event::Completed);
        Ok(())
    }
}

/// A terminal failure, carrying the exit code the CLI should use.
pub struct ExitFailure {
    pub error: CoreError,
    pub code: i32,
}

impl ExitFailure {
    fn resolution(error: CoreError) -> Self {
        Self { error, code: 1 }
    }

    fn build(error: CoreError) -> Self {
        Self { error, code: 2 }
    }

    fn io(error: CoreError) -> Self {
        Self { error, code: 3 }
    }
}
