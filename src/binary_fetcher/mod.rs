//! Binary-artifact fetcher: prebuilt framework downloads as a build
//! shortcut, with transparent fallback to source.
//!
//! For a dependency pinned to a tag, fetch that tag's release metadata,
//! filter its assets down to recognizable framework-bundle archives, cache
//! each asset content-addressed by `(dep, tag, asset id, asset name)`,
//! unzip into a scratch directory, and copy every framework bundle found
//! into the platform-appropriate output directory. Any failure in this path
//! is swallowed by the caller in favor of a source build; this module only
//! ever returns an error for conditions the caller should actually act on
//! (a malformed cache path, a write failure), never for "no binary
//! available" which is represented as `Outcome::Skipped`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::core::CoreError;
use crate::dependency::Dependency;
use crate::io;

const MIME_ALLOWLIST: &[&str] = &["application/zip", "application/x-zip-compressed", "application/octet-stream"];
const FRAMEWORK_PATTERNS: &[&str] = &[".framework", ".xcframework"];

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    draft: bool,
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReleaseAsset {
    id: u64,
    name: String,
    #[serde(rename = "content_type")]
    mime_type: String,
    #[serde(rename = "browser_download_url")]
    download_url: String,
}

/// The target platform a framework binary was built for, inferred from its
/// architecture list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryPlatform {
    Device,
    SimulatorOrHost,
}

/// What fetching binaries for a dependency produced.
pub enum Outcome {
    Fetched { tag: String, copied: Vec<PathBuf> },
    Skipped { reason: String },
}

/// Filter a release's asset list to framework-bundle archives with an
/// allow-listed MIME type.
fn filter_assets(assets: &[ReleaseAsset]) -> Vec<&ReleaseAsset> {
    assets
        .iter()
        .filter(|a| FRAMEWORK_PATTERNS.iter().any(|p| a.name.contains(p)))
        .filter(|a| MIME_ALLOWLIST.contains(&a.mime_type.as_str()))
        .collect()
}

fn cache_path(cache_root: &Path, dep: &Dependency, tag: &str, asset: &ReleaseAsset) -> PathBuf {
    cache_root
        .join("binaries")
        .join(dep.clone_dir_name())
        .join(tag)
        .join(format!("{}-{}", asset.id, asset.name))
}

/// Fetch the exact, non-draft release tagged `tag` for `dep`, or `None` if
/// no such release exists.
async fn fetch_release(
    client: &reqwest::Client,
    dep: &Dependency,
    tag: &str,
    auth_token: Option<&str>,
) -> Result<Option<Release>, CoreError> {
    let Dependency::Hosted { host, owner, repo } = dep else {
        return Ok(None);
    };
    let url = format!("https://api.{host}/repos/{owner}/{repo}/releases/tags/{tag}");
    let response = authed_get(client, &url, auth_token)
        .await
        .map_err(|e| CoreError::NetworkError { url: url.clone(), cause: e.to_string() })?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(CoreError::NetworkError { url, cause: response.status().to_string() });
    }

    let release: Release = response
        .json()
        .await
        .map_err(|e| CoreError::NetworkError { url, cause: e.to_string() })?;

    if release.draft || release.tag_name != tag {
        return Ok(None);
    }
    Ok(Some(release))
}

async fn authed_get(
    client: &reqwest::Client,
    url: &str,
    auth_token: Option<&str>,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut request = client.get(url).header("User-Agent", "depcore");
    if let Some(token) = auth_token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    if matches!(response.status(), reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN)
        && auth_token.is_some()
    {
        return client.get(url).header("User-Agent", "depcore").send().await;
    }
    Ok(response)
}

/// Ensure `asset` is present at its cache path, downloading and atomically
/// renaming into place if not.
async fn ensure_cached(
    client: &reqwest::Client,
    cache_root: &Path,
    dep: &Dependency,
    tag: &str,
    asset: &ReleaseAsset,
    auth_token: Option<&str>,
) -> Result<PathBuf, CoreError> {
    let dest = cache_path(cache_root, dep, tag, asset);
    if dest.is_file() {
        return Ok(dest);
    }

    let parent = dest.parent().expect("cache path always has a parent");
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| CoreError::WriteFailed { path: parent.to_path_buf(), os_err: e.to_string() })?;

    let response = authed_get(client, &asset.download_url, auth_token)
        .await
        .map_err(|e| CoreError::NetworkError { url: asset.download_url.clone(), cause: e.to_string() })?;
    if !response.status().is_success() {
        return Err(CoreError::NetworkError {
            url: asset.download_url.clone(),
            cause: response.status().to_string(),
        });
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| CoreError::NetworkError { url: asset.download_url.clone(), cause: e.to_string() })?;

    let temp_path = dest.with_extension("download.tmp");
    tokio::fs::write(&temp_path, &bytes)
        .await
        .map_err(|e| CoreError::WriteFailed { path: temp_path.clone(), os_err: e.to_string() })?;
    tokio::fs::rename(&temp_path, &dest)
        .await
        .map_err(|e| CoreError::WriteFailed { path: dest.clone(), os_err: e.to_string() })?;

    Ok(dest)
}

fn unzip_into(archive_path: &Path, dest_dir: &Path) -> Result<(), CoreError> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| CoreError::ReadFailed { path: archive_path.to_path_buf(), os_err: e.to_string() })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| CoreError::ReadFailed { path: archive_path.to_path_buf(), os_err: e.to_string() })?;
    archive
        .extract(dest_dir)
        .map_err(|e| CoreError::WriteFailed { path: dest_dir.to_path_buf(), os_err: e.to_string() })
}

/// Every top-level framework bundle under `root`, skipping nested ones
/// inside an already-found bundle.
fn find_framework_bundles(root: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let mut bundles = Vec::new();
    io::fsutil::enumerate_dir(root, |mut entry| {
        if !entry.is_dir {
            return;
        }
        let is_bundle = entry
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext == "framework" || ext == "xcframework");
        if is_bundle {
            bundles.push(entry.path.clone());
            entry.skip_subtree();
        }
    })?;
    Ok(bundles)
}

/// Infer the target platform of a framework bundle's binary from its
/// architecture list, as reported by an external `lipo -archs`-equivalent
/// invocation.
pub fn classify_platform(archs: &[String]) -> BinaryPlatform {
    if archs.iter().any(|a| a.starts_with("arm") && !a.starts_with("arm64-sim")) {
        BinaryPlatform::Device
    } else {
        BinaryPlatform::SimulatorOrHost
    }
}

/// Fetch and install prebuilt binaries for `dep` at `tag` into
/// `output_dir/<platform>`. Returns `Outcome::Skipped` for any non-fatal
/// reason (`dep` isn't hosted, no matching release, no matching assets);
/// the caller should fall back to a source build in that case.
pub async fn fetch_binaries(
    client: &reqwest::Client,
    cache_root: &Path,
    dep: &Dependency,
    tag: &str,
    output_dir: &Path,
    auth_token: Option<&str>,
) -> Result<Outcome, CoreError> {
    let Some(release) = fetch_release(client, dep, tag, auth_token).await? else {
        return Ok(Outcome::Skipped { reason: "no matching non-draft release".into() });
    };

    let candidates = filter_assets(&release.assets);
    if candidates.is_empty() {
        return Ok(Outcome::Skipped { reason: "no framework-bundle assets in release".into() });
    }

    let temp_dir = tempfile::Builder::new()
        .prefix("depcore-binary-")
        .tempdir()
        .map_err(|e| CoreError::WriteFailed { path: PathBuf::from("<tmp>"), os_err: e.to_string() })?;

    let mut copied = Vec::new();
    for asset in candidates {
        let archive_path = ensure_cached(client, cache_root, dep, tag, asset, auth_token).await?;
        let extract_dir = temp_dir.path().join(&asset.name);
        unzip_into(&archive_path, &extract_dir)?;

        for bundle in find_framework_bundles(&extract_dir)? {
            let name = bundle.file_name().expect("bundle path has a name");
            let dest = output_dir.join(name);
            io::fsutil::copy_tree(&bundle, &dest)?;
            copied.push(dest);
        }
    }

    if copied.is_empty() {
        return Ok(Outcome::Skipped { reason: "no framework bundles found in any downloaded asset".into() });
    }

    Ok(Outcome::Fetched { tag: tag.to_string(), copied })
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: u64, name: &str, mime: &str) -> ReleaseAsset {
        ReleaseAsset { id, name: name.into(), mime_type: mime.into(), download_url: format!("https://x/{name}") }
    }

    #[test]
    fn filters_to_framework_assets_with_allowed_mime() {
        let assets = vec![
            asset(1, "Foo.xcframework.zip", "application/zip"),
            asset(2, "readme.txt", "text/plain"),
            asset(3, "Bar.framework.zip", "application/pdf"),
        ];
        let kept = filter_assets(&assets);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "Foo.xcframework.zip");
    }

    #[test]
    fn cache_path_is_content_addressed_by_dep_tag_and_asset() {
        let dep = Dependency::Hosted { host: "github.com".into(), owner: "o".into(), repo: "r".into() };
        let a = asset(42, "Foo.xcframework.zip", "application/zip");
        let path = cache_path(Path::new("/cache"), &dep, "1.2.0", &a);
        assert_eq!(path, Path::new("/cache/binaries/github.com-o-r/1.2.0/42-Foo.xcframework.zip"));
    }

    #[test]
    fn classifies_arm_as_device_and_x86_64_as_simulator() {
        assert_eq!(classify_platform(&["arm64".to_string()]), BinaryPlatform::Device);
        assert_eq!(classify_platform(&["x86_64".to_string()]), BinaryPlatform::SimulatorOrHost);
    }

    #[test]
    fn classifies_arm64_simulator_slice_as_simulator() {
        assert_eq!(classify_platform(&["arm64-sim".to_string()]), BinaryPlatform::SimulatorOrHost);
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(sha256_hex(b""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85");
    }
}
