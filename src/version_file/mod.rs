//! Version file / build cache manifest (§4.7 in the design doc): records
//! what was built for a dependency at a revision so the build orchestrator
//! can skip rebuilding when nothing has changed.
//!
//! Write path: [`create_version_file`]. Read path: [`matches`], returning
//! `None` when no version file exists, `Some(false)` when the cache is
//! stale, `Some(true)` when it's safe to reuse.
//!
//! A toolchain-versioned product whose recorded toolchain differs from the
//! local one is normally stale, but not if it's certified module-stable: a
//! module built with library evolution enabled carries a `.swiftinterface`
//! alongside its `.swiftmodule`/`.toolchainmodule` and can be consumed by a
//! different (compatible) toolchain version without rebuilding.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::binary_fetcher::sha256_hex;
use crate::core::CoreError;
use crate::io;
use crate::utils::fs::safe_write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub hash: String,
    pub linking: Linkage,
    #[serde(rename = "swiftToolchainVersion", skip_serializing_if = "Option::is_none")]
    pub swift_toolchain_version: Option<String>,
    /// Library-evolution module, safe to reuse across a toolchain-version
    /// mismatch. Always `false` for a product with no recorded toolchain
    /// version.
    #[serde(rename = "moduleStable", default, skip_serializing_if = "std::ops::Not::not")]
    pub module_stable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionFile {
    pub commitish: String,
    #[serde(flatten)]
    pub platforms: BTreeMap<String, Vec<ProductRecord>>,
}

/// One built product ready to be recorded, identified by the platform it
/// was built for and its on-disk location (a framework bundle directory, or
/// a bare product file).
pub struct BuiltProduct {
    pub platform: String,
    pub path: PathBuf,
}

fn version_file_path(build_root: &Path, dep_name: &str) -> PathBuf {
    build_root.join(format!(".{dep_name}.version"))
}

/// Write the version file for `dep_name` at `revision`, hashing each
/// product in `built_products`. Writes an empty-platforms file when
/// `built_products` is empty, so a later run can tell "nothing to build"
/// apart from "never built".
pub async fn create_version_file(
    dep_name: &str,
    revision: &str,
    built_products: &[BuiltProduct],
    build_root: &Path,
) -> Result<PathBuf, CoreError> {
    let mut platforms: BTreeMap<String, Vec<ProductRecord>> = BTreeMap::new();
    for product in built_products {
        let record = record_for_product(&product.path).await?;
        platforms.entry(product.platform.clone()).or_default().push(record);
    }

    let version_file = VersionFile { commitish: revision.to_string(), platforms };
    let path = version_file_path(build_root, dep_name);
    let json = serde_json::to_string_pretty(&version_file)
        .map_err(|e| CoreError::BuildOutputParseError { reason: e.to_string() })?;
    safe_write(&path, &json).map_err(|e| CoreError::WriteFailed { path: path.clone(), os_err: e.to_string() })?;
    Ok(path)
}

/// Whether the version file at `build_root` for `dep_name` certifies that
/// `revision`'s products, for every platform in `platforms`, are still
/// present and unchanged.
pub async fn matches(
    dep_name: &str,
    revision: &str,
    platforms: &[String],
    build_root: &Path,
    local_toolchain: Option<&str>,
) -> Option<bool> {
    let path = version_file_path(build_root, dep_name);
    let text = tokio::fs::read_to_string(&path).await.ok()?;
    let version_file: VersionFile = serde_json::from_str(&text).ok()?;

    if version_file.commitish != revision {
        return Some(false);
    }

    for platform in platforms {
        let Some(products) = version_file.platforms.get(platform) else {
            return Some(false);
        };
        for product in products {
            let product_path = build_root.join(platform).join(&product.name);
            let Ok(bytes) = tokio::fs::read(binary_within(&product_path)).await else {
                return Some(false);
            };
            if sha256_hex(&bytes) != product.hash {
                return Some(false);
            }
            if let Some(recorded) = &product.swift_toolchain_version {
                if local_toolchain != Some(recorded.as_str()) && !product.module_stable {
                    return Some(false);
                }
            }
        }
    }

    Some(true)
}

/// The actual binary file inside a product path: the path itself if it's
/// already a file, or `<bundle>/<stem>` for a framework bundle directory.
fn binary_within(product_path: &Path) -> PathBuf {
    if product_path.is_dir() {
        let stem = product_path.file_stem().unwrap_or_default();
        product_path.join(stem)
    } else {
        product_path.to_path_buf()
    }
}

async fn record_for_product(path: &Path) -> Result<ProductRecord, CoreError> {
    let binary_path = binary_within(path);
    let bytes = tokio::fs::read(&binary_path)
        .await
        .map_err(|e| CoreError::ReadFailed { path: binary_path.clone(), os_err: e.to_string() })?;
    let hash = sha256_hex(&bytes);
    let swift_toolchain_version = probe_swift_toolchain_version(path)?;
    let module_stable = swift_toolchain_version.is_some() && probe_module_stable(path)?;
    let linking = detect_linkage(&binary_path).await;
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    Ok(ProductRecord { name, hash, linking, swift_toolchain_version, module_stable })
}

/// A product is toolchain-versioned if it carries both a `*-Swift.h` header
/// and a `*.toolchainmodule` directory; the version is parsed out of the
/// header's `// Swift version X.Y` comment line.
fn probe_swift_toolchain_version(bundle_path: &Path) -> Result<Option<String>, CoreError> {
    if !bundle_path.is_dir() {
        return Ok(None);
    }

    let mut header_text = None;
    let mut has_toolchainmodule = false;
    io::fsutil::enumerate_dir(bundle_path, |entry| {
        if entry.is_dir
            && entry.path.extension().and_then(|e| e.to_str()) == Some("toolchainmodule")
        {
            has_toolchainmodule = true;
        }
        if !entry.is_dir
            && entry.path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with("-Swift.h"))
        {
            header_text = std::fs::read_to_string(&entry.path).ok();
        }
    })?;

    if !has_toolchainmodule {
        return Ok(None);
    }
    let Some(text) = header_text else { return Ok(None) };
    Ok(parse_swift_version_comment(&text))
}

/// A module is library-evolution-enabled, and so safe to consume across a
/// toolchain-version mismatch, if its `.swiftmodule`/`.toolchainmodule`
/// directory carries a `.swiftinterface` file alongside the compiled module.
fn probe_module_stable(bundle_path: &Path) -> Result<bool, CoreError> {
    let mut has_swiftinterface = false;
    io::fsutil::enumerate_dir(bundle_path, |entry| {
        if !entry.is_dir
            && entry.path.extension().and_then(|e| e.to_str()) == Some("swiftinterface")
        {
            has_swiftinterface = true;
        }
    })?;
    Ok(has_swiftinterface)
}

fn parse_swift_version_comment(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let line = line.trim();
        line.strip_prefix("// Swift version ").map(|rest| rest.trim().to_string())
    })
}

async fn detect_linkage(binary_path: &Path) -> Linkage {
    let Ok(mut handle) = io::process::spawn("file", &[&binary_path.to_string_lossy()], None) else {
        return Linkage::Dynamic;
    };
    let mut output = String::new();
    while let Some(line) = handle.stdout.recv().await {
        output.push_str(&line);
    }
    let _ = handle.wait().await;
    if output.to_lowercase().contains("statically linked") {
        Linkage::Static
    } else {
        Linkage::Dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_then_matches_round_trips_true() {
        let build_root = tempdir().unwrap();
        let product_path = build_root.path().join("device").join("Foo");
        tokio::fs::create_dir_all(product_path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&product_path, b"binary bytes").await.unwrap();

        let products = vec![BuiltProduct { platform: "device".into(), path: product_path }];
        create_version_file("Foo", "1.2.1", &products, build_root.path()).await.unwrap();

        let result = matches("Foo", "1.2.1", &["device".to_string()], build_root.path(), None).await;
        assert_eq!(result, Some(true));
    }

    #[tokio::test]
    async fn mismatched_commitish_is_stale() {
        let build_root = tempdir().unwrap();
        let product_path = build_root.path().join("device").join("Foo");
        tokio::fs::create_dir_all(product_path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&product_path, b"binary bytes").await.unwrap();

        let products = vec![BuiltProduct { platform: "device".into(), path: product_path }];
        create_version_file("Foo", "1.2.1", &products, build_root.path()).await.unwrap();

        let result = matches("Foo", "1.3.0", &["device".to_string()], build_root.path(), None).await;
        assert_eq!(result, Some(false));
    }

    #[tokio::test]
    async fn changed_product_bytes_are_stale() {
        let build_root = tempdir().unwrap();
        let product_path = build_root.path().join("device").join("Foo");
        tokio::fs::create_dir_all(product_path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&product_path, b"binary bytes").await.unwrap();

        let products = vec![BuiltProduct { platform: "device".into(), path: product_path.clone() }];
        create_version_file("Foo", "1.2.1", &products, build_root.path()).await.unwrap();

        tokio::fs::write(&product_path, b"different bytes").await.unwrap();

        let result = matches("Foo", "1.2.1", &["device".to_string()], build_root.path(), None).await;
        assert_eq!(result, Some(false));
    }

    #[tokio::test]
    async fn missing_version_file_is_none() {
        let build_root = tempdir().unwrap();
        let result = matches("Foo", "1.2.1", &["device".to_string()], build_root.path(), None).await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn empty_built_products_still_writes_a_file() {
        let build_root = tempdir().unwrap();
        let path = create_version_file("Foo", "1.2.1", &[], build_root.path()).await.unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn parses_swift_version_from_header_comment() {
        let text = "// Generated\n// Swift version 5.9\n#define X 1\n";
        assert_eq!(parse_swift_version_comment(text), Some("5.9".to_string()));
    }

    #[tokio::test]
    async fn toolchain_mismatch_on_a_module_stable_product_is_not_stale() {
        let build_root = tempdir().unwrap();
        let version_file = VersionFile {
            commitish: "1.2.1".to_string(),
            platforms: BTreeMap::from([(
                "device".to_string(),
                vec![ProductRecord {
                    name: "Foo".to_string(),
                    hash: sha256_hex(b"binary bytes"),
                    linking: Linkage::Dynamic,
                    swift_toolchain_version: Some("5.9".to_string()),
                    module_stable: true,
                }],
            )]),
        };
        let json = serde_json::to_string_pretty(&version_file).unwrap();
        safe_write(&version_file_path(build_root.path(), "Foo"), &json).unwrap();

        let product_path = build_root.path().join("device").join("Foo");
        tokio::fs::create_dir_all(product_path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&product_path, b"binary bytes").await.unwrap();

        let result = matches("Foo", "1.2.1", &["device".to_string()], build_root.path(), Some("6.0")).await;
        assert_eq!(result, Some(true));
    }

    #[tokio::test]
    async fn toolchain_mismatch_on_a_non_module_stable_product_is_stale() {
        let build_root = tempdir().unwrap();
        let version_file = VersionFile {
            commitish: "1.2.1".to_string(),
            platforms: BTreeMap::from([(
                "device".to_string(),
                vec![ProductRecord {
                    name: "Foo".to_string(),
                    hash: sha256_hex(b"binary bytes"),
                    linking: Linkage::Dynamic,
                    swift_toolchain_version: Some("5.9".to_string()),
                    module_stable: false,
                }],
            )]),
        };
        let json = serde_json::to_string_pretty(&version_file).unwrap();
        safe_write(&version_file_path(build_root.path(), "Foo"), &json).unwrap();

        let product_path = build_root.path().join("device").join("Foo");
        tokio::fs::create_dir_all(product_path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&product_path, b"binary bytes").await.unwrap();

        let result = matches("Foo", "1.2.1", &["device".to_string()], build_root.path(), Some("6.0")).await;
        assert_eq!(result, Some(false));
    }
}
