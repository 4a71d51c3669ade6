//! Version-constraint algebra.
//!
//! `SemVer`: `(major, minor, patch, pre_release, build_metadata)`. Build
//! metadata is ignored in ordering and equality for resolution purposes;
//! pre-release identifiers order below the same `major.minor.patch`
//! non-pre-release, with dot-component comparison per SemVer §11. Parsing is
//! strict: no leading zeros in numeric pre-release identifiers, ASCII
//! alphanumerics and hyphen only.
//!
//! `VersionSpec`: `Any | AtLeast(SemVer) | CompatibleWith(SemVer) |
//! Exactly(SemVer) | GitRef(String)`.
//!
//! `ConcreteVersion`: a `(PinnedRevision, Option<SemVer>)` pair, ordered with
//! semantic versions before non-semantic, descending among semantic, and
//! lexicographic among non-semantic.

pub mod version_set;

use std::cmp::Ordering;
use std::fmt;

pub use version_set::SortedVersionSet;

/// An opaque commit-ish: a tag name or a commit hash. Ordered lexicographically
/// only, for tie-breaking among non-semantic revisions.
pub type PinnedRevision = String;

/// A parse failure, carrying the offending text for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (at `{input}`)")]
pub struct ParseError {
    pub message: String,
    pub input: String,
}

impl ParseError {
    fn new(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self { message: message.into(), input: source.into() }
    }
}

/// A parsed semantic version.
#[derive(Debug, Clone, Eq)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Option<String>,
    pub build_metadata: Option<String>,
}

impl SemVer {
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch, pre_release: None, build_metadata: None }
    }

    #[must_use]
    pub fn is_pre_release(&self) -> bool {
        self.pre_release.is_some()
    }

    /// The exclusive upper bound of `CompatibleWith(self)`'s admitted range.
    #[must_use]
    pub fn caret_upper_bound(&self) -> Self {
        if self.major > 0 {
            Self::new(self.major + 1, 0, 0)
        } else {
            Self::new(0, self.minor + 1, 0)
        }
    }

    /// Numeric-only `(major, minor, patch)` comparison, ignoring pre-release.
    fn numeric_eq(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor && self.patch == other.patch
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.build_metadata {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl PartialEq for SemVer {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major
            && self.minor == other.minor
            && self.patch == other.patch
            && self.pre_release == other.pre_release
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| compare_pre_release(self.pre_release.as_deref(), other.pre_release.as_deref()))
    }
}

/// Per SemVer §11: a version without a pre-release has higher precedence than
/// one with; otherwise compare dot-separated identifiers left to right.
fn compare_pre_release(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let a_ids = a.split('.');
            let b_ids = b.split('.');
            let mut a_ids = a_ids.peekable();
            let mut b_ids = b_ids.peekable();
            loop {
                match (a_ids.next(), b_ids.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(x), Some(y)) => {
                        let ord = compare_pre_release_identifier(x, y);
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                }
            }
        }
    }
}

fn compare_pre_release_identifier(a: &str, b: &str) -> Ordering {
    let a_numeric = a.chars().all(|c| c.is_ascii_digit());
    let b_numeric = b.chars().all(|c| c.is_ascii_digit());
    match (a_numeric, b_numeric) {
        (true, true) => {
            let a_val: u64 = a.parse().unwrap_or(0);
            let b_val: u64 = b.parse().unwrap_or(0);
            a_val.cmp(&b_val)
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

/// A user-written constraint over admissible versions of a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Any,
    AtLeast(SemVer),
    CompatibleWith(SemVer),
    Exactly(SemVer),
    GitRef(String),
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, ""),
            Self::AtLeast(v) => write!(f, ">= {v}"),
            Self::CompatibleWith(v) => write!(f, "~> {v}"),
            Self::Exactly(v) => write!(f, "== {v}"),
            Self::GitRef(r) => write!(f, "\"{r}\""),
        }
    }
}

/// A resolver-internal `(revision, optional-semver)` pair used for ordering
/// candidates within a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteVersion {
    pub revision: PinnedRevision,
    pub semver: Option<SemVer>,
}

impl ConcreteVersion {
    #[must_use]
    pub fn semantic(revision: impl Into<String>, semver: SemVer) -> Self {
        Self { revision: revision.into(), semver: Some(semver) }
    }

    #[must_use]
    pub fn non_semantic(revision: impl Into<String>) -> Self {
        Self { revision: revision.into(), semver: None }
    }
}

impl PartialOrd for ConcreteVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConcreteVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.semver, &other.semver) {
            (Some(a), Some(b)) => b.cmp(a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.revision.cmp(&other.revision),
        }
    }
}

/// Tolerate a leading `v` or `version-` prefix; numeric-only
/// `major.minor.patch`; optional `-<preRelease>` and `+<buildMetadata>`;
/// reject leading zeros in purely numeric pre-release identifiers; reject
/// empty segments.
pub fn parse_semver(revision: &str) -> Result<SemVer, ParseError> {
    let original = revision;
    let stripped = revision
        .strip_prefix("version-")
        .or_else(|| revision.strip_prefix('v'))
        .unwrap_or(revision);

    let (core, build_metadata) = match stripped.split_once('+') {
        Some((core, build)) => {
            if build.is_empty() || !build.chars().all(is_ident_char) {
                return Err(ParseError::new("invalid build metadata", original));
            }
            (core, Some(build.to_string()))
        }
        None => (stripped, None),
    };

    let (numeric_part, pre_release) = match core.split_once('-') {
        Some((numeric, pre)) => {
            if pre.is_empty() {
                return Err(ParseError::new("empty pre-release identifier", original));
            }
            for ident in pre.split('.') {
                validate_pre_release_identifier(ident, original)?;
            }
            (numeric, Some(pre.to_string()))
        }
        None => (core, None),
    };

    let mut parts = numeric_part.split('.');
    let major = parse_numeric_segment(parts.next(), original)?;
    let minor = parse_numeric_segment(parts.next(), original)?;
    let patch = parse_numeric_segment(parts.next(), original)?;
    if parts.next().is_some() {
        return Err(ParseError::new("too many version segments", original));
    }

    Ok(SemVer { major, minor, patch, pre_release, build_metadata })
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

fn parse_numeric_segment(segment: Option<&str>, original: &str) -> Result<u64, ParseError> {
    let segment = segment.ok_or_else(|| ParseError::new("missing version segment", original))?;
    if segment.is_empty() {
        return Err(ParseError::new("empty version segment", original));
    }
    if segment.len() > 1 && segment.starts_with('0') {
        return Err(ParseError::new("leading zero in numeric segment", original));
    }
    segment
        .parse()
        .map_err(|_| ParseError::new(format!("`{segment}` is not a non-negative integer"), original))
}

fn validate_pre_release_identifier(ident: &str, original: &str) -> Result<(), ParseError> {
    if ident.is_empty() {
        return Err(ParseError::new("empty pre-release identifier segment", original));
    }
    if !ident.chars().all(is_ident_char) {
        return Err(ParseError::new(
            format!("pre-release identifier `{ident}` has invalid characters"),
            original,
        ));
    }
    let is_numeric = ident.chars().all(|c| c.is_ascii_digit());
    if is_numeric && ident.len() > 1 && ident.starts_with('0') {
        return Err(ParseError::new(
            format!("numeric pre-release identifier `{ident}` has a leading zero"),
            original,
        ));
    }
    Ok(())
}

/// Parse a manifest spec: operators `==`, `>=`, `~>`; a quoted git reference
/// `"name"`; empty text means `Any`.
pub fn parse_spec(text: &str) -> Result<VersionSpec, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(VersionSpec::Any);
    }
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        return Ok(VersionSpec::GitRef(trimmed[1..trimmed.len() - 1].to_string()));
    }
    if let Some(rest) = trimmed.strip_prefix("==") {
        return Ok(VersionSpec::Exactly(parse_semver(rest.trim())?));
    }
    if let Some(rest) = trimmed.strip_prefix(">=") {
        return Ok(VersionSpec::AtLeast(parse_semver(rest.trim())?));
    }
    if let Some(rest) = trimmed.strip_prefix("~>") {
        return Ok(VersionSpec::CompatibleWith(parse_semver(rest.trim())?));
    }
    Err(ParseError::new("unrecognized version spec operator", text))
}

/// Whether `spec` admits `concrete`, per §3's satisfaction rules.
#[must_use]
pub fn is_satisfied_by(spec: &VersionSpec, concrete: &ConcreteVersion) -> bool {
    let Some(v) = &concrete.semver else {
        // Non-semantic (branch-like) revisions are admitted by any non-Exactly spec.
        return !matches!(spec, VersionSpec::Exactly(_));
    };

    match spec {
        VersionSpec::Any => !v.is_pre_release(),
        VersionSpec::GitRef(_) => true,
        VersionSpec::Exactly(r) => v == r,
        VersionSpec::AtLeast(r) => satisfies_lower_bound(v, r),
        VersionSpec::CompatibleWith(r) => {
            let in_bucket = if r.major > 0 { v.major == r.major } else { v.minor == r.minor };
            in_bucket && satisfies_lower_bound(v, r)
        }
    }
}

fn satisfies_lower_bound(v: &SemVer, r: &SemVer) -> bool {
    if v.is_pre_release() {
        r.is_pre_release() && v.numeric_eq(r) && v >= r
    } else {
        v >= r
    }
}

/// A partial function returning a single spec admitting exactly the
/// intersection of `a`'s and `b`'s admitted versions, or `None` if that
/// intersection is empty. Commutative, idempotent, associative.
#[must_use]
pub fn intersection(a: &VersionSpec, b: &VersionSpec) -> Option<VersionSpec> {
    use VersionSpec::{Any, AtLeast, CompatibleWith, Exactly, GitRef};

    match (a, b) {
        (Any, Any) => Some(Any),
        (GitRef(r), GitRef(s)) => (r == s).then(|| GitRef(r.clone())),
        (GitRef(_), other) | (other, GitRef(_)) => Some(other.clone()),
        (Any, Exactly(c)) | (Exactly(c), Any) => {
            (!c.is_pre_release()).then(|| Exactly(c.clone()))
        }
        (Any, other) | (other, Any) => Some(other.clone()),
        (AtLeast(x), AtLeast(y)) => Some(AtLeast(if x >= y { x.clone() } else { y.clone() })),
        (AtLeast(a), CompatibleWith(b)) | (CompatibleWith(b), AtLeast(a)) => {
            let upper = b.caret_upper_bound();
            if a <= b {
                Some(CompatibleWith(b.clone()))
            } else if a < &upper {
                Some(CompatibleWith(a.clone()))
            } else {
                None
            }
        }
        (AtLeast(a), Exactly(c)) | (Exactly(c), AtLeast(a)) => (c >= a).then(|| Exactly(c.clone())),
        (CompatibleWith(x), CompatibleWith(y)) => {
            let same_bucket = if x.major > 0 || y.major > 0 {
                x.major == y.major
            } else {
                x.minor == y.minor
            };
            same_bucket.then(|| CompatibleWith(if x >= y { x.clone() } else { y.clone() }))
        }
        (CompatibleWith(b), Exactly(c)) | (Exactly(c), CompatibleWith(b)) => {
            is_satisfied_by(&CompatibleWith(b.clone()), &ConcreteVersion::semantic("", c.clone()))
                .then(|| Exactly(c.clone()))
        }
        (Exactly(c), Exactly(d)) => (c == d).then(|| Exactly(c.clone())),
    }
}
