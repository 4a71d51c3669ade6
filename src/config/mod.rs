//! Layered configuration: defaults, overridden by an optional global config
//! file, overridden by environment variables.
//!
//! Every field has a default, so a missing config file is not an error —
//! only a malformed one is.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub cache_root: PathBuf,
    pub url_rewrites: Vec<(String, String)>,
    pub auth_tokens: HashMap<String, String>,
    pub toolchain_version_override: Option<String>,
    pub default_platforms: Vec<String>,
    pub build_tool: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            url_rewrites: Vec::new(),
            auth_tokens: HashMap::new(),
            toolchain_version_override: None,
            default_platforms: vec!["Mac".to_string()],
            build_tool: "xcodebuild".to_string(),
        }
    }
}

fn default_cache_root() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".depcore").join("cache")
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("depcore").join("config.toml"))
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    cache: RawCache,
    #[serde(default)]
    auth: HashMap<String, String>,
    #[serde(default, rename = "url_rewrite")]
    url_rewrite: HashMap<String, String>,
    #[serde(default)]
    build: RawBuild,
}

#[derive(Debug, Default, Deserialize)]
struct RawCache {
    root: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBuild {
    toolchain_version_override: Option<String>,
    default_platforms: Option<Vec<String>>,
    tool: Option<String>,
}

impl Config {
    /// Load from the default per-user config path, falling back to an
    /// all-defaults config when no file exists there. `GITHUB_TOKEN`
    /// overrides any token loaded from the file for `github.com`, and
    /// `DEPCORE_CACHE_DIR` overrides the cache root.
    pub fn load() -> Result<Self, CoreError> {
        match default_config_path() {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => Ok(Self::with_env_overrides(Self::default())),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::ReadFailed { path: path.to_path_buf(), os_err: e.to_string() })?;
        let raw: RawConfig = toml::from_str(&text)
            .map_err(|e| CoreError::ManifestParseError { path: path.to_path_buf(), reason: e.to_string() })?;
        Ok(Self::with_env_overrides(Self::from_raw(raw)))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            cache_root: raw.cache.root.map(expand_tilde).unwrap_or(defaults.cache_root),
            url_rewrites: raw.url_rewrite.into_iter().collect(),
            auth_tokens: raw.auth,
            toolchain_version_override: raw.build.toolchain_version_override.filter(|s| !s.is_empty()),
            default_platforms: raw.build.default_platforms.unwrap_or(defaults.default_platforms),
            build_tool: raw.build.tool.unwrap_or(defaults.build_tool),
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var("DEPCORE_CACHE_DIR") {
            self.cache_root = PathBuf::from(root);
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            self.auth_tokens.entry("github.com".to_string()).or_insert(token);
        }
        self
    }

    #[must_use]
    pub fn auth_token_for(&self, host: &str) -> Option<&str> {
        self.auth_tokens.get(host).map(String::as_str)
    }
}

fn expand_tilde(path: String) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
