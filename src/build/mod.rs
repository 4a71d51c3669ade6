//! Build orchestrator (§4.8): turns a checked-out dependency's project tree
//! into framework bundles, one per requested platform, skipping the work
//! entirely when the version file says nothing has changed.
//!
//! The pipeline per dependency: locate project/workspace files, enumerate
//! and filter buildable (dynamic framework) schemes, pair each scheme with
//! its containing workspace or project, build each scheme once per required
//! SDK, merge multi-SDK output into a single fat framework per platform,
//! post-process (strip unrequested archs, drop header/module directories,
//! generate dSYMs, optionally code-sign), and write the version file back.

pub mod scheme;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{CoreError, Event, EventSink};
use crate::io;
use crate::version_file::{self, BuiltProduct};
use scheme::{FrameworkType, ProjectKind, ProjectRef, SchemeSettings};

const SCHEME_LIST_TIMEOUT: Duration = Duration::from_secs(60);
const SCHEME_LIST_RETRIES: usize = 2;

/// Friendly platform name to the SDK identifiers a build must cover.
const PLATFORM_SDKS: &[(&str, &[&str])] = &[
    ("iOS", &["iphoneos", "iphonesimulator"]),
    ("tvOS", &["appletvos", "appletvsimulator"]),
    ("watchOS", &["watchos", "watchsimulator"]),
    ("visionOS", &["xros", "xrsimulator"]),
    ("macOS", &["macosx"]),
];

fn sdks_for_platform(platform: &str) -> &'static [&'static str] {
    PLATFORM_SDKS.iter().find(|(p, _)| *p == platform).map_or(&[], |(_, s)| s)
}

fn is_simulator_sdk(sdk: &str) -> bool {
    sdk.contains("simulator") || sdk.contains("xrsimulator")
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub build_tool: String,
    pub bitcode_enabled: bool,
    pub code_sign_identity: Option<String>,
}

async fn run_capturing(program: &str, args: &[&str]) -> Result<(String, String, std::process::ExitStatus), CoreError> {
    let mut handle = io::process::spawn(program, args, None)?;
    let mut stdout = String::new();
    while let Some(line) = handle.stdout.recv().await {
        stdout.push_str(&line);
        stdout.push('\n');
    }
    let mut stderr = String::new();
    while let Some(line) = handle.stderr.recv().await {
        stderr.push_str(&line);
        stderr.push('\n');
    }
    let status = handle.wait().await?;
    Ok((stdout, stderr, status))
}

async fn run_with_retry(build_tool: &str, args: &[&str]) -> Result<String, CoreError> {
    let mut last_err = None;
    for _ in 0..=SCHEME_LIST_RETRIES {
        match tokio::time::timeout(SCHEME_LIST_TIMEOUT, run_capturing(build_tool, args)).await {
            Ok(Ok((stdout, _stderr, status))) if status.success() => return Ok(stdout),
            Ok(Ok((_, stderr, status))) => {
                let argv = std::iter::once(build_tool.to_string()).chain(args.iter().map(|s| s.to_string())).collect();
                last_err = Some(CoreError::from_exit_status(argv, status, &stderr));
            }
            Ok(Err(e)) => last_err = Some(e),
            Err(_) => {
                last_err = Some(CoreError::Timeout { operation: format!("{build_tool} {}", args.join(" ")) });
            }
        }
    }
    Err(last_err.unwrap_or(CoreError::Other { message: "build tool invocation failed".into() }))
}

fn container_flag_and_path(container: &ProjectRef) -> (&'static str, String) {
    match container.kind {
        ProjectKind::Workspace => ("-workspace", container.path.to_string_lossy().into_owned()),
        ProjectKind::Project => ("-project", container.path.to_string_lossy().into_owned()),
    }
}

async fn enumerate_schemes(build_tool: &str, container: &ProjectRef) -> Result<Vec<String>, CoreError> {
    let (flag, path) = container_flag_and_path(container);
    let output = run_with_retry(build_tool, &[flag, &path, "-list"]).await?;
    scheme::parse_scheme_list(&output)
}

async fn load_scheme_settings(
    build_tool: &str,
    container: &ProjectRef,
    scheme_name: &str,
) -> Result<SchemeSettings, CoreError> {
    let (flag, path) = container_flag_and_path(container);
    let output = run_with_retry(build_tool, &[flag, &path, "-scheme", scheme_name, "-showBuildSettings"]).await?;
    Ok(scheme::parse_build_settings(scheme_name, &output))
}

/// Every buildable scheme discovered under `working_dir`, paired with the
/// workspace or project that contains it. A scheme found in more than one
/// container keeps its first (workspace-before-project, shallower-first)
/// pairing.
async fn discover_buildable_schemes(
    build_tool: &str,
    working_dir: &Path,
    required_sdks: &[String],
) -> Result<Vec<(SchemeSettings, ProjectRef)>, CoreError> {
    let all_projects = scheme::locate_projects(working_dir)?;
    let (workspaces, projects): (Vec<_>, Vec<_>) =
        all_projects.into_iter().partition(|p| p.kind == ProjectKind::Workspace);

    let mut schemes_by_container: std::collections::BTreeMap<PathBuf, Vec<String>> = std::collections::BTreeMap::new();
    let mut scheme_names: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    for container in workspaces.iter().chain(projects.iter()) {
        let found = enumerate_schemes(build_tool, container).await?;
        scheme_names.extend(found.iter().cloned());
        schemes_by_container.insert(container.path.clone(), found);
    }

    let mut settings = Vec::new();
    for scheme_name in &scheme_names {
        let Some(container) = scheme::pair_with_container(scheme_name, &workspaces, &projects, |c, s| {
            schemes_by_container.get(&c.path).is_some_and(|names| names.iter().any(|n| n == s))
        }) else {
            continue;
        };
        settings.push((load_scheme_settings(build_tool, container, scheme_name).await?, container.clone()));
    }

    let just_settings: Vec<SchemeSettings> = settings.iter().map(|(s, _)| s.clone()).collect();
    let buildable = scheme::filter_buildable(&just_settings, required_sdks);
    Ok(settings.into_iter().filter(|(s, _)| buildable.iter().any(|b| b.name == s.name)).collect())
}

/// Build one scheme for one SDK, writing its product into `dest_dir`.
/// Archive is used for device SDKs (it strips debug-only settings a plain
/// `build` action leaves in); a plain build is used for simulator SDKs.
async fn build_scheme_for_sdk(
    container: &ProjectRef,
    scheme_name: &str,
    sdk: &str,
    dest_dir: &Path,
    config: &BuildConfig,
) -> Result<PathBuf, CoreError> {
    let (flag, path) = container_flag_and_path(container);
    let dest = dest_dir.to_string_lossy().into_owned();
    let config_dir_override = format!("CONFIGURATION_BUILD_DIR={dest}");
    let build_dir_override = format!("BUILD_DIR={dest}");
    let bitcode_override = format!("ENABLE_BITCODE={}", if config.bitcode_enabled { "YES" } else { "NO" });

    let action = if is_simulator_sdk(sdk) { "build" } else { "archive" };
    let mut args = vec![flag, path.as_str(), "-scheme", scheme_name, "-sdk", sdk, action];
    args.extend(["-configuration", "Release", &config_dir_override, &build_dir_override, &bitcode_override]);
    if action == "archive" {
        args.push("SKIP_INSTALL=NO");
    }

    run_with_retry(&config.build_tool, &args).await.map_err(|e| match e {
        CoreError::SubprocessError { stderr_tail, .. } => {
            CoreError::BuildFailed { dep: scheme_name.to_string(), scheme: scheme_name.to_string(), log: stderr_tail }
        }
        other => other,
    })?;

    Ok(dest_dir.join(format!("{scheme_name}.framework")))
}

/// Merge multiple single-arch framework bundles (one per SDK) into a single
/// fat bundle: the first bundle's tree is the base, its binary replaced by a
/// `lipo`-merged combination of every bundle's binary.
async fn merge_frameworks(bundles: &[PathBuf], dest: &Path) -> Result<(), CoreError> {
    let Some(base) = bundles.first() else {
        return Err(CoreError::Other { message: "no framework bundles to merge".into() });
    };
    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| CoreError::WriteFailed { path: dest.to_path_buf(), os_err: e.to_string() })?;
    }
    io::fsutil::copy_tree(base, dest)?;

    if bundles.len() == 1 {
        return Ok(());
    }

    let stem = dest.file_stem().unwrap_or_default().to_string_lossy().into_owned();
    let merged_binary = dest.join(&stem);
    let mut lipo_args: Vec<String> = vec!["-create".to_string()];
    for bundle in bundles {
        let binary = bundle.join(bundle.file_stem().unwrap_or_default());
        lipo_args.push(binary.to_string_lossy().into_owned());
    }
    lipo_args.push("-output".to_string());
    lipo_args.push(merged_binary.to_string_lossy().into_owned());

    let args: Vec<&str> = lipo_args.iter().map(String::as_str).collect();
    io::process::spawn_and_wait("lipo", &args, None).await
}

/// Remove architectures not present in `keep_archs` from a framework's
/// binary, dropping Headers/PrivateHeaders/Modules (a consumer links the
/// prebuilt binary; it doesn't need the framework's own build-time headers).
async fn post_process(bundle: &Path, keep_archs: &[String]) -> Result<(), CoreError> {
    let stem = bundle.file_stem().unwrap_or_default().to_string_lossy().into_owned();
    let binary = bundle.join(&stem);

    if !keep_archs.is_empty() {
        let mut args: Vec<String> = vec!["-create".to_string()];
        for arch in keep_archs {
            args.push("-extract".to_string());
            args.push(arch.clone());
        }
        args.push(binary.to_string_lossy().into_owned());
        args.push("-output".to_string());
        args.push(binary.to_string_lossy().into_owned());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        io::process::spawn_and_wait("lipo", &refs, None).await?;
    }

    for dir_name in ["Headers", "PrivateHeaders", "Modules"] {
        let path = bundle.join(dir_name);
        if path.is_dir() {
            std::fs::remove_dir_all(&path)
                .map_err(|e| CoreError::WriteFailed { path: path.clone(), os_err: e.to_string() })?;
        }
    }
    Ok(())
}

/// Copy each UUID's `.bcsymbolmap` file (produced alongside a bitcode
/// archive build) from `source_dir` next to `bundle`, identifying the
/// needed UUIDs via `dwarfdump --uuid`. Best-effort: a dwarfdump failure or
/// a missing symbol map is not fatal, since bitcode is optional.
async fn copy_bcsymbolmaps(bundle: &Path, binary: &Path, source_dir: &Path, dest_dir: &Path) -> Result<(), CoreError> {
    let Ok((stdout, _, status)) = run_capturing("dwarfdump", &["--uuid", &binary.to_string_lossy()]).await else {
        return Ok(());
    };
    if !status.success() {
        return Ok(());
    }
    let _ = bundle;
    for line in stdout.lines() {
        let Some(uuid) = line.split_whitespace().nth(1) else { continue };
        let symbol_map = source_dir.join(format!("{uuid}.bcsymbolmap"));
        if symbol_map.is_file() {
            let dest = dest_dir.join(format!("{uuid}.bcsymbolmap"));
            let _ = std::fs::copy(&symbol_map, &dest);
        }
    }
    Ok(())
}

/// Generate a dSYM bundle alongside `bundle` via `dsymutil`.
async fn generate_dsym(bundle: &Path) -> Result<PathBuf, CoreError> {
    let stem = bundle.file_stem().unwrap_or_default().to_string_lossy().into_owned();
    let binary = bundle.join(&stem);
    let dsym_path = bundle.with_extension("framework.dSYM");
    io::process::spawn_and_wait(
        "dsymutil",
        &[binary.to_string_lossy().as_ref(), "-o", dsym_path.to_string_lossy().as_ref()],
        None,
    )
    .await?;
    Ok(dsym_path)
}

async fn code_sign(bundle: &Path, identity: &str) -> Result<(), CoreError> {
    io::process::spawn_and_wait("codesign", &["--force", "--sign", identity, bundle.to_string_lossy().as_ref()], None)
        .await
}

/// Build every requested platform for `dep_name`'s checkout at
/// `working_dir`, skipping entirely when the version file already certifies
/// `revision` is current. Returns the built products (empty when the cache
/// hit and nothing needed rebuilding).
#[allow(clippy::too_many_arguments)]
pub async fn build_dependency(
    dep_name: &str,
    working_dir: &Path,
    platforms: &[String],
    build_root: &Path,
    revision: &str,
    local_toolchain: Option<&str>,
    config: &BuildConfig,
    sink: &dyn EventSink,
) -> Result<Vec<BuiltProduct>, CoreError> {
    if let Some(true) = version_file::matches(dep_name, revision, platforms, build_root, local_toolchain).await {
        for platform in platforms {
            sink.emit(Event::Cached(dep_name.to_string(), platform.clone()));
        }
        return Ok(Vec::new());
    }

    let required_sdks: Vec<String> =
        platforms.iter().flat_map(|p| sdks_for_platform(p)).map(|s| (*s).to_string()).collect();
    let buildable = discover_buildable_schemes(&config.build_tool, working_dir, &required_sdks).await?;
    if buildable.is_empty() {
        return Err(CoreError::NoSharedFrameworkSchemes { dep: dep_name.to_string(), platforms: platforms.to_vec() });
    }

    let scratch = tempfile::Builder::new()
        .prefix("depcore-build-")
        .tempdir()
        .map_err(|e| CoreError::WriteFailed { path: PathBuf::from("<tmp>"), os_err: e.to_string() })?;

    let mut built_products = Vec::new();
    for (settings, container) in &buildable {
        if settings.framework_type != FrameworkType::Dynamic {
            continue;
        }
        for platform in platforms {
            let sdks: Vec<&str> = sdks_for_platform(platform)
                .iter()
                .filter(|s| settings.supported_platforms.iter().any(|p| p == *s))
                .copied()
                .collect();
            if sdks.is_empty() {
                continue;
            }

            sink.emit(Event::Building(dep_name.to_string(), settings.name.clone(), platform.clone()));

            let mut per_sdk_bundles = Vec::new();
            for sdk in &sdks {
                let sdk_dir = scratch.path().join(sdk);
                tokio::fs::create_dir_all(&sdk_dir)
                    .await
                    .map_err(|e| CoreError::WriteFailed { path: sdk_dir.clone(), os_err: e.to_string() })?;
                let bundle = build_scheme_for_sdk(container, &settings.name, sdk, &sdk_dir, config).await?;
                per_sdk_bundles.push(bundle);
            }

            let platform_dir = build_root.join(platform);
            tokio::fs::create_dir_all(&platform_dir)
                .await
                .map_err(|e| CoreError::WriteFailed { path: platform_dir.clone(), os_err: e.to_string() })?;
            let dest = platform_dir.join(format!("{}.framework", settings.name));
            merge_frameworks(&per_sdk_bundles, &dest).await?;
            post_process(&dest, &[]).await?;
            generate_dsym(&dest).await?;
            if config.bitcode_enabled {
                if let Some(device_idx) = sdks.iter().position(|sdk| !is_simulator_sdk(sdk)) {
                    let binary = dest.join(&settings.name);
                    let source_dir = per_sdk_bundles[device_idx].parent().unwrap_or(&dest).to_path_buf();
                    copy_bcsymbolmaps(&dest, &binary, &source_dir, &platform_dir).await?;
                }
            }
            if let Some(identity) = &config.code_sign_identity {
                code_sign(&dest, identity).await?;
            }

            sink.emit(Event::Built(dep_name.to_string(), settings.name.clone(), platform.clone()));
            built_products.push(BuiltProduct { platform: platform.clone(), path: dest });
        }
    }

    version_file::create_version_file(dep_name, revision, &built_products, build_root).await?;
    Ok(built_products)
}
