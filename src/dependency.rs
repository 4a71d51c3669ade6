//! Dependency identity.
//!
//! A [`Dependency`] is an identity for a remote source: either a hosted
//! repository reference (host + owner + repo) or a raw git URL. Equality is
//! structural; the identity determines both the on-disk clone path and the
//! remote URL, which may be rewritten HTTPS↔SSH by [`crate::config::Config`].

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependency {
    Hosted { host: String, owner: String, repo: String },
    Raw { url: String },
}

impl Dependency {
    /// Parse a manifest identity string: `owner/repo` (hosted on `github.com`)
    /// or a full URL (raw).
    #[must_use]
    pub fn parse_identity(identity: &str, kind: &str) -> Self {
        // `binary` directives reference a hosted repository's releases the
        // same way `github` directives reference its tags; only `git`
        // carries a raw URL identity.
        if kind == "github" || kind == "binary" {
            let (owner, repo) = identity.split_once('/').unwrap_or((identity, ""));
            Self::Hosted { host: "github.com".into(), owner: owner.into(), repo: repo.into() }
        } else if let Some((host, rest)) = parse_url_host(identity) {
            if let Some((owner, repo)) = rest.trim_matches('/').split_once('/') {
                Self::Hosted {
                    host,
                    owner: owner.into(),
                    repo: repo.trim_end_matches(".git").into(),
                }
            } else {
                Self::Raw { url: identity.to_string() }
            }
        } else {
            Self::Raw { url: identity.to_string() }
        }
    }

    /// A short, human-readable name used in events, caches and errors.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Hosted { owner, repo, .. } => format!("{owner}/{repo}"),
            Self::Raw { url } => url.clone(),
        }
    }

    /// The remote clone URL, honoring the configured HTTPS↔SSH rewrite rules.
    #[must_use]
    pub fn remote_url(&self, rewrites: &[(String, String)]) -> String {
        let base = match self {
            Self::Hosted { host, owner, repo } => format!("https://{host}/{owner}/{repo}.git"),
            Self::Raw { url } => url.clone(),
        };
        for (from, to) in rewrites {
            if let Some(rest) = base.strip_prefix(from.as_str()) {
                return format!("{to}{rest}");
            }
        }
        base
    }

    /// The on-disk clone path under `<cache_root>/dependencies/`.
    #[must_use]
    pub fn clone_dir_name(&self) -> String {
        match self {
            Self::Hosted { host, owner, repo } => format!("{host}-{owner}-{repo}"),
            Self::Raw { url } => sanitize_for_path(url),
        }
    }

    #[must_use]
    pub fn clone_path(&self, cache_root: &std::path::Path) -> PathBuf {
        cache_root.join("dependencies").join(self.clone_dir_name())
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn parse_url_host(identity: &str) -> Option<(String, String)> {
    let rest = identity.strip_prefix("https://").or_else(|| identity.strip_prefix("http://"))?;
    let (host, path) = rest.split_once('/')?;
    Some((host.to_string(), path.to_string()))
}

fn sanitize_for_path(url: &str) -> String {
    url.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_github_identity() {
        let dep = Dependency::parse_identity("owner/repo", "github");
        assert_eq!(
            dep,
            Dependency::Hosted { host: "github.com".into(), owner: "owner".into(), repo: "repo".into() }
        );
        assert_eq!(dep.name(), "owner/repo");
    }

    #[test]
    fn parses_binary_identity_the_same_as_github() {
        let dep = Dependency::parse_identity("owner/repo", "binary");
        assert_eq!(
            dep,
            Dependency::Hosted { host: "github.com".into(), owner: "owner".into(), repo: "repo".into() }
        );
    }

    #[test]
    fn parses_raw_https_url_as_hosted_when_it_looks_hosted() {
        let dep = Dependency::parse_identity("https://gitlab.example.com/owner/repo.git", "git");
        assert_eq!(
            dep,
            Dependency::Hosted {
                host: "gitlab.example.com".into(),
                owner: "owner".into(),
                repo: "repo".into()
            }
        );
    }

    #[test]
    fn remote_url_applies_rewrite_rules() {
        let dep = Dependency::Hosted {
            host: "github.com".into(),
            owner: "o".into(),
            repo: "r".into(),
        };
        let rewrites = vec![("https://github.com/".to_string(), "git@github.com:".to_string())];
        assert_eq!(dep.remote_url(&rewrites), "git@github.com:o/r.git");
    }

    #[test]
    fn equality_is_structural() {
        let a = Dependency::parse_identity("owner/repo", "github");
        let b = Dependency::parse_identity("owner/repo", "github");
        assert_eq!(a, b);
    }
}
