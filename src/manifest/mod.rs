//! Manifest and lockfile parsing.
//!
//! Manifest: line-oriented text, one directive per line:
//! `<kind> "<identity>" <spec>` where `<kind>` is `git`, `github` or
//! `binary`; `<identity>` is a URL or `owner/repo`; `<spec>` is empty,
//! `== x.y.z`, `>= x.y.z`, `~> x.y.z`, or `"refname"`. Duplicate identities
//! are a parse error. A sibling private manifest may exist with the same
//! grammar; duplicates across the two files are errors.
//!
//! Lockfile: one line per resolved dependency, `<kind> "<identity>" "<revision>"`.

use std::path::Path;

use crate::core::CoreError;
use crate::dependency::Dependency;
use crate::version::{parse_spec, VersionSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub kind: String,
    pub identity: String,
    pub dependency: Dependency,
    pub spec: VersionSpec,
}

/// Parse manifest text into its directives. Fails on a duplicate identity.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>, CoreError> {
    let mut entries = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let entry = parse_line(trimmed, line_no + 1)?;
        if !seen.insert(entry.identity.clone()) {
            return Err(CoreError::DuplicateIdentity { identity: entry.identity });
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn parse_line(line: &str, line_no: usize) -> Result<ManifestEntry, CoreError> {
    let mut parts = line.splitn(2, char::is_whitespace);
    let kind = parts.next().unwrap_or_default().to_string();
    if !matches!(kind.as_str(), "git" | "github" | "binary") {
        return Err(parse_error(line_no, format!("unknown directive kind `{kind}`")));
    }
    let rest = parts.next().unwrap_or_default().trim();

    let (identity, spec_text) = split_quoted_identity(rest, line_no)?;
    let spec = parse_spec(spec_text.trim())
        .map_err(|e| parse_error(line_no, format!("invalid version spec: {e}")))?;
    let dependency = Dependency::parse_identity(&identity, &kind);

    Ok(ManifestEntry { kind, identity, dependency, spec })
}

fn split_quoted_identity(rest: &str, line_no: usize) -> Result<(String, &str), CoreError> {
    let rest = rest.trim_start();
    if !rest.starts_with('"') {
        return Err(parse_error(line_no, "expected quoted identity"));
    }
    let after_quote = &rest[1..];
    let end = after_quote
        .find('"')
        .ok_or_else(|| parse_error(line_no, "unterminated quoted identity"))?;
    let identity = after_quote[..end].to_string();
    let remainder = &after_quote[end + 1..];
    Ok((identity, remainder))
}

fn parse_error(line_no: usize, reason: impl std::fmt::Display) -> CoreError {
    CoreError::ManifestParseError {
        path: Path::new("<manifest>").to_path_buf(),
        reason: format!("line {line_no}: {reason}"),
    }
}

/// Print a manifest entry back to its line form (modulo whitespace).
#[must_use]
pub fn format_entry(entry: &ManifestEntry) -> String {
    let spec = match &entry.spec {
        VersionSpec::Any => String::new(),
        other => other.to_string(),
    };
    if spec.is_empty() {
        format!("{} \"{}\"", entry.kind, entry.identity)
    } else {
        format!("{} \"{}\" {}", entry.kind, entry.identity, spec)
    }
}

/// Merge a project manifest with its optional sibling private manifest,
/// erroring on duplicate identities across the two.
pub fn merge_with_private(
    main: Vec<ManifestEntry>,
    private: Vec<ManifestEntry>,
) -> Result<Vec<ManifestEntry>, CoreError> {
    let mut seen: std::collections::HashSet<String> =
        main.iter().map(|e| e.identity.clone()).collect();
    let mut merged = main;
    for entry in private {
        if !seen.insert(entry.identity.clone()) {
            return Err(CoreError::DuplicateIdentity { identity: entry.identity });
        }
        merged.push(entry);
    }
    Ok(merged)
}

/// One resolved dependency entry in the lockfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub kind: String,
    pub identity: String,
    pub revision: String,
}

pub fn parse_lockfile(text: &str) -> Result<Vec<LockEntry>, CoreError> {
    let mut entries = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let kind = parts.next().unwrap_or_default().to_string();
        let rest = parts.next().unwrap_or_default().trim();
        let (identity, remainder) = split_quoted_identity(rest, line_no + 1)
            .map_err(|_| lock_parse_error(line_no + 1, "expected quoted identity"))?;
        let remainder = remainder.trim();
        if !remainder.starts_with('"') || !remainder.ends_with('"') || remainder.len() < 2 {
            return Err(lock_parse_error(line_no + 1, "expected quoted revision"));
        }
        let revision = remainder[1..remainder.len() - 1].to_string();
        entries.push(LockEntry { kind, identity, revision });
    }
    Ok(entries)
}

fn lock_parse_error(line_no: usize, reason: impl std::fmt::Display) -> CoreError {
    CoreError::LockfileParseError {
        path: Path::new("<lockfile>").to_path_buf(),
        reason: format!("line {line_no}: {reason}"),
    }
}

#[must_use]
pub fn format_lockfile(entries: &[LockEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{} \"{}\" \"{}\"", e.kind, e.identity, e.revision))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_manifest() {
        let text = "github \"o/A\" ~> 1.2\ngit \"https://example.com/x.git\"\n";
        let entries = parse_manifest(text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identity, "o/A");
        assert_eq!(entries[0].spec, VersionSpec::CompatibleWith(crate::version::SemVer::new(1, 2, 0)));
        assert_eq!(entries[1].spec, VersionSpec::Any);
    }

    #[test]
    fn parses_git_ref_spec() {
        let entries = parse_manifest("github \"o/A\" \"main\"\n").unwrap();
        assert_eq!(entries[0].spec, VersionSpec::GitRef("main".into()));
    }

    #[test]
    fn rejects_duplicate_identity() {
        let text = "github \"o/A\" >= 1.0\ngithub \"o/A\" == 2.0.0\n";
        assert!(parse_manifest(text).is_err());
    }

    #[test]
    fn round_trips_through_format_entry() {
        let text = "github \"o/A\" >= 1.2.0";
        let entry = parse_manifest(text).unwrap().remove(0);
        assert_eq!(format_entry(&entry), text);
    }

    #[test]
    fn lockfile_round_trips() {
        let entries = vec![LockEntry {
            kind: "github".into(),
            identity: "o/A".into(),
            revision: "1.2.1".into(),
        }];
        let text = format_lockfile(&entries);
        assert_eq!(parse_lockfile(&text).unwrap(), entries);
    }

    #[test]
    fn merge_with_private_rejects_cross_file_duplicates() {
        let main = parse_manifest("github \"o/A\" >= 1.0\n").unwrap();
        let private = parse_manifest("github \"o/A\" == 2.0.0\n").unwrap();
        assert!(merge_with_private(main, private).is_err());
    }
}
