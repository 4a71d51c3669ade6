//! Project/scheme discovery and the pure parsing logic behind it — kept
//! separate from [`super`]'s process-invoking orchestration so the format
//! parsing can be tested against fixture text without a real build tool.

use std::path::{Path, PathBuf};

use crate::core::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProjectKind {
    Workspace,
    Project,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    pub kind: ProjectKind,
    pub path: PathBuf,
}

const SKIP_DIR_NAMES: &[&str] = &[".git", "Checkouts", "Carthage", "Pods"];

/// Every workspace/project bundle under `root`, skipping submodule/checkout
/// directories and not descending into a bundle once found. Ordered
/// shallower-first; workspaces before projects at the same depth; then
/// lexicographic path.
pub fn locate_projects(root: &Path) -> Result<Vec<ProjectRef>, CoreError> {
    let mut found = Vec::new();
    crate::io::fsutil::enumerate_dir(root, |mut entry| {
        if !entry.is_dir {
            return;
        }
        let skip = entry.path.file_name().and_then(|n| n.to_str()).is_some_and(|n| SKIP_DIR_NAMES.contains(&n));
        if skip {
            entry.skip_subtree();
            return;
        }
        if let Some(kind) = project_kind(&entry.path) {
            found.push(ProjectRef { kind, path: entry.path.clone() });
            entry.skip_subtree();
        }
    })?;

    found.sort_by(|a, b| {
        depth(&a.path, root).cmp(&depth(&b.path, root)).then(a.kind.cmp(&b.kind)).then_with(|| a.path.cmp(&b.path))
    });
    Ok(found)
}

fn project_kind(path: &Path) -> Option<ProjectKind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("xcworkspace") => Some(ProjectKind::Workspace),
        Some("xcodeproj") => Some(ProjectKind::Project),
        _ => None,
    }
}

fn depth(path: &Path, root: &Path) -> usize {
    path.strip_prefix(root).map(|p| p.components().count()).unwrap_or(0)
}

/// Parse a `-list` invocation's stdout: scheme names appear one per line
/// between a `Schemes:` header and the next blank line.
pub fn parse_scheme_list(output: &str) -> Result<Vec<String>, CoreError> {
    if output.contains("contains no schemes") || output.contains("There are no schemes") {
        return Err(CoreError::NoSharedSchemes { project: String::new() });
    }

    let mut schemes = Vec::new();
    let mut in_schemes = false;
    for line in output.lines() {
        if line.trim() == "Schemes:" {
            in_schemes = true;
            continue;
        }
        if in_schemes {
            if line.trim().is_empty() {
                break;
            }
            schemes.push(line.trim().to_string());
        }
    }
    Ok(schemes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkType {
    Dynamic,
    Static,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeSettings {
    pub name: String,
    pub framework_type: FrameworkType,
    pub supported_platforms: Vec<String>,
}

/// Parse `-showBuildSettings` output into a [`SchemeSettings`], pulling
/// `PRODUCT_TYPE` and `SUPPORTED_PLATFORMS` out of its `KEY = value` lines.
pub fn parse_build_settings(scheme_name: &str, output: &str) -> SchemeSettings {
    let mut product_type = String::new();
    let mut supported_platforms = Vec::new();
    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once('=') else { continue };
        let key = key.trim();
        let value = value.trim();
        if key == "PRODUCT_TYPE" {
            product_type = value.to_string();
        } else if key == "SUPPORTED_PLATFORMS" {
            supported_platforms = value.split_whitespace().map(str::to_string).collect();
        }
    }
    let framework_type = if product_type.ends_with("product-type.framework") {
        FrameworkType::Dynamic
    } else if product_type.ends_with("product-type.framework.static") {
        FrameworkType::Static
    } else {
        FrameworkType::Other
    };
    SchemeSettings { name: scheme_name.to_string(), framework_type, supported_platforms }
}

/// Schemes whose product is a dynamic framework and whose supported
/// platforms intersect the requested set.
#[must_use]
pub fn filter_buildable(schemes: &[SchemeSettings], requested_platforms: &[String]) -> Vec<SchemeSettings> {
    schemes
        .iter()
        .filter(|s| {
            s.framework_type == FrameworkType::Dynamic
                && s.supported_platforms.iter().any(|p| requested_platforms.contains(p))
        })
        .cloned()
        .collect()
}

/// The container a scheme is built in: its first containing workspace, else
/// its owning project. `contains_scheme` is supplied by the caller since
/// membership requires inspecting the container (an external-tool query).
pub fn pair_with_container<'a>(
    scheme: &str,
    workspaces: &'a [ProjectRef],
    projects: &'a [ProjectRef],
    contains_scheme: impl Fn(&ProjectRef, &str) -> bool,
) -> Option<&'a ProjectRef> {
    workspaces
        .iter()
        .find(|w| contains_scheme(w, scheme))
        .or_else(|| projects.iter().find(|p| contains_scheme(p, scheme)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkKind {
    Device,
    Simulator,
}

#[must_use]
pub fn sdk_kind(sdk: &str) -> SdkKind {
    if sdk.contains("simulator") {
        SdkKind::Simulator
    } else {
        SdkKind::Device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schemes_between_header_and_blank_line() {
        let output = "Information about project \"Foo\":\n    Schemes:\n        FooA\n        FooB\n\n    Build Configurations:\n";
        let schemes = parse_scheme_list(output).unwrap();
        assert_eq!(schemes, vec!["FooA".to_string(), "FooB".to_string()]);
    }

    #[test]
    fn rejects_project_with_no_schemes() {
        let output = "This project contains no schemes.\n";
        assert!(parse_scheme_list(output).is_err());
    }

    #[test]
    fn parses_build_settings_for_dynamic_framework() {
        let output = "    PRODUCT_TYPE = com.apple.product-type.framework\n    SUPPORTED_PLATFORMS = iphoneos iphonesimulator\n";
        let settings = parse_build_settings("Foo", output);
        assert_eq!(settings.framework_type, FrameworkType::Dynamic);
        assert_eq!(settings.supported_platforms, vec!["iphoneos".to_string(), "iphonesimulator".to_string()]);
    }

    #[test]
    fn filter_buildable_excludes_static_and_unmatched_platforms() {
        let schemes = vec![
            SchemeSettings {
                name: "Dynamic".into(),
                framework_type: FrameworkType::Dynamic,
                supported_platforms: vec!["iphoneos".into()],
            },
            SchemeSettings {
                name: "Static".into(),
                framework_type: FrameworkType::Static,
                supported_platforms: vec!["iphoneos".into()],
            },
            SchemeSettings {
                name: "WrongPlatform".into(),
                framework_type: FrameworkType::Dynamic,
                supported_platforms: vec!["macosx".into()],
            },
        ];
        let buildable = filter_buildable(&schemes, &["iphoneos".to_string()]);
        assert_eq!(buildable.len(), 1);
        assert_eq!(buildable[0].name, "Dynamic");
    }

    #[test]
    fn sdk_kind_distinguishes_simulator_from_device() {
        assert_eq!(sdk_kind("iphoneos"), SdkKind::Device);
        assert_eq!(sdk_kind("iphonesimulator"), SdkKind::Simulator);
    }

    #[test]
    fn pair_with_container_prefers_workspace_over_project() {
        let workspace = ProjectRef { kind: ProjectKind::Workspace, path: PathBuf::from("App.xcworkspace") };
        let project = ProjectRef { kind: ProjectKind::Project, path: PathBuf::from("Foo.xcodeproj") };
        let workspaces = [workspace.clone()];
        let projects = [project];
        let found = pair_with_container("FooScheme", &workspaces, &projects, |_, _| true);
        assert_eq!(found, Some(&workspace));
    }
}
