//! Platform-specific helpers for path and command-name resolution.
//!
//! Abstracts the differences between Windows and Unix-like systems that the
//! rest of the crate needs to account for: the home directory, the git
//! executable name, and long-path handling on Windows.

use anyhow::Result;
use std::path::PathBuf;

/// Checks if the current platform is Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Gets the home directory path for the current user.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        let platform_help = if is_windows() {
            "On Windows: Check that the USERPROFILE environment variable is set"
        } else {
            "On Unix/Linux: Check that the HOME environment variable is set"
        };
        anyhow::anyhow!("Could not determine home directory.\n\n{platform_help}")
    })
}

/// Returns the appropriate Git command name for the current platform.
#[must_use]
pub const fn get_git_command() -> &'static str {
    if is_windows() { "git.exe" } else { "git" }
}

/// Handles Windows long paths (>260 characters) by applying UNC prefixes.
/// No-op on other platforms.
#[cfg(windows)]
#[must_use]
pub fn windows_long_path(path: &std::path::Path) -> PathBuf {
    if path.as_os_str().len() < 200 {
        return path.to_path_buf();
    }

    let path_str = path.to_string_lossy();
    if path_str.len() > 260 && !path_str.starts_with(r"\\?\") {
        let absolute_path = if path.is_relative() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(path)
        } else {
            path.to_path_buf()
        };

        let absolute_str = absolute_path.to_string_lossy();
        if absolute_str.len() > 260 {
            if let Some(stripped) = absolute_str.strip_prefix(r"\\") {
                PathBuf::from(format!(r"\\?\UNC\{}", stripped))
            } else {
                PathBuf::from(format!(r"\\?\{}", absolute_str))
            }
        } else {
            absolute_path
        }
    } else {
        path.to_path_buf()
    }
}

#[cfg(not(windows))]
#[must_use]
pub fn windows_long_path(path: &std::path::Path) -> PathBuf {
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_command() {
        let cmd = get_git_command();
        #[cfg(windows)]
        assert_eq!(cmd, "git.exe");
        #[cfg(not(windows))]
        assert_eq!(cmd, "git");
    }

    #[test]
    fn test_get_home_dir() -> Result<()> {
        let home_path = get_home_dir()?;
        assert!(home_path.exists());
        Ok(())
    }

    #[test]
    fn test_windows_long_path_short_is_noop() {
        let path = std::path::Path::new("/test/path");
        let result = windows_long_path(path);
        assert_eq!(result, path.to_path_buf());
    }
}
