//! Structural error types for the dependency core.
//!
//! [`CoreError`] enumerates every failure mode named in the error handling
//! design: parse errors, constraint errors, I/O errors and build errors.
//! [`ErrorContext`] wraps a [`CoreError`] with an optional suggestion and
//! optional details for colored terminal display; [`user_friendly_error`]
//! converts an arbitrary [`anyhow::Error`] into one.

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

use crate::version::{SemVer, VersionSpec};

/// Every structural failure mode the core can produce.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    // --- Parse errors ---
    #[error("failed to parse manifest at {path}: {reason}")]
    ManifestParseError { path: PathBuf, reason: String },

    #[error("failed to parse lockfile at {path}: {reason}")]
    LockfileParseError { path: PathBuf, reason: String },

    #[error("invalid semver `{input}`: {reason}")]
    SemverParseError { input: String, reason: String },

    #[error("unexpected build tool output: {reason}")]
    BuildOutputParseError { reason: String },

    #[error("duplicate dependency identity `{identity}` in manifest")]
    DuplicateIdentity { identity: String },

    // --- Constraint errors ---
    #[error("dependency `{dep}` has incompatible requirements: {spec_a} vs {spec_b}")]
    IncompatibleRequirements { dep: String, spec_a: String, spec_b: String },

    #[error("no version of `{dep}` satisfies {spec}")]
    RequiredVersionNotFound { dep: String, spec: String },

    #[error("dependency `{dep}` has no tagged versions")]
    TaggedVersionNotFound { dep: String },

    #[error("could not resolve dependencies: {0:?}")]
    UnresolvedDependencies(Vec<String>),

    // --- I/O errors ---
    #[error("failed to read {path}: {os_err}")]
    ReadFailed { path: PathBuf, os_err: String },

    #[error("failed to write {path}: {os_err}")]
    WriteFailed { path: PathBuf, os_err: String },

    #[error("network error fetching {url}: {cause}")]
    NetworkError { url: String, cause: String },

    #[error("subprocess {argv:?} failed with {exit_status:?}: {stderr_tail}")]
    SubprocessError { argv: Vec<String>, exit_status: Option<i32>, stderr_tail: String },

    #[error("operation timed out: {operation}")]
    Timeout { operation: String },

    // --- Build errors ---
    #[error("project {project} has no shared schemes")]
    NoSharedSchemes { project: String },

    #[error("dependency `{dep}` has no shared framework schemes for platforms {platforms:?}")]
    NoSharedFrameworkSchemes { dep: String, platforms: Vec<String> },

    #[error("build of `{dep}` scheme `{scheme}` failed:\n{log}")]
    BuildFailed { dep: String, scheme: String, log: String },

    #[error("binary {bin} has invalid architectures")]
    InvalidArchitectures { bin: PathBuf },

    #[error("binary {bin} has invalid UUIDs")]
    InvalidUUIDs { bin: PathBuf },

    #[error("toolchain version mismatch: local {local} vs framework {framework}")]
    IncompatibleToolchainVersions { local: String, framework: String },

    #[error("{message}")]
    Other { message: String },
}

impl CoreError {
    #[must_use]
    pub fn incompatible(dep: impl Into<String>, a: &VersionSpec, b: &VersionSpec) -> Self {
        Self::IncompatibleRequirements {
            dep: dep.into(),
            spec_a: a.to_string(),
            spec_b: b.to_string(),
        }
    }

    #[must_use]
    pub fn required_not_found(dep: impl Into<String>, spec: &VersionSpec) -> Self {
        Self::RequiredVersionNotFound { dep: dep.into(), spec: spec.to_string() }
    }

    #[must_use]
    pub fn semver_error(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SemverParseError { input: input.into(), reason: reason.into() }
    }

    pub fn from_exit_status(argv: Vec<String>, status: ExitStatus, stderr: &str) -> Self {
        let tail: String =
            stderr.lines().rev().take(20).collect::<Vec<_>>().into_iter().rev().collect::<Vec<_>>().join("\n");
        Self::SubprocessError { argv, exit_status: status.code(), stderr_tail: tail }
    }
}

/// Render a [`SemVer`] the way errors want to display it.
#[must_use]
pub fn semver_display(v: &SemVer) -> String {
    v.to_string()
}

/// A [`CoreError`] decorated with an optional actionable suggestion and
/// optional extra details, for terminal display.
#[derive(Debug)]
pub struct ErrorContext {
    pub error: CoreError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(error: CoreError) -> Self {
        Self { error, suggestion: None, details: None }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error, details, and suggestion to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert an arbitrary error into a user-friendly, suggestion-bearing
/// context for terminal display. Falls back to a generic context when the
/// error does not downcast to a [`CoreError`].
#[must_use]
pub fn user_friendly_error(err: anyhow::Error) -> ErrorContext {
    match err.downcast::<CoreError>() {
        Ok(core_err) => attach_suggestion(core_err),
        Err(err) => ErrorContext::new(CoreError::Other { message: err.to_string() }),
    }
}

fn attach_suggestion(error: CoreError) -> ErrorContext {
    let ctx = ErrorContext::new(error);
    match &ctx.error {
        CoreError::TaggedVersionNotFound { .. } => {
            ctx.with_suggestion("confirm the dependency's remote has at least one tag")
        }
        CoreError::UnresolvedDependencies(_) => {
            ctx.with_suggestion("relax a version constraint or update the lockfile")
        }
        CoreError::NetworkError { .. } => {
            ctx.with_suggestion("check connectivity and any configured auth token")
        }
        CoreError::ManifestParseError { .. } | CoreError::LockfileParseError { .. } => {
            ctx.with_details("one directive per line: <kind> \"<identity>\" <spec>")
        }
        _ => ctx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_suggestion_and_details() {
        let ctx = ErrorContext::new(CoreError::TaggedVersionNotFound { dep: "o/A".into() })
            .with_suggestion("push a tag")
            .with_details("the resolver needs at least one tag to pick a candidate");
        let rendered = ctx.to_string();
        assert!(rendered.contains("push a tag"));
        assert!(rendered.contains("at least one tag"));
    }

    #[test]
    fn user_friendly_error_downcasts_core_error() {
        let err: anyhow::Error = CoreError::TaggedVersionNotFound { dep: "o/A".into() }.into();
        let ctx = user_friendly_error(err);
        assert!(ctx.suggestion.is_some());
    }

    #[test]
    fn user_friendly_error_wraps_other_errors() {
        let err = anyhow::anyhow!("some other failure");
        let ctx = user_friendly_error(err);
        assert!(matches!(ctx.error, CoreError::Other { .. }));
    }
}
