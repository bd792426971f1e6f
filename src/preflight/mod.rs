//! Preflight checks run before a platform is launched.
//!
//! Finding the Java executable up front turns a missing JDK into a clear
//! configuration error instead of a failed spawn after every bundle has been
//! downloaded.
//!
//! # Example
//!
//! ```rust,no_run
//! use framework_runner::preflight::{java_executable, locate_java_home};
//!
//! if let Some(home) = locate_java_home() {
//!     match java_executable(&home) {
//!         Ok(java) => println!("using {}", java.display()),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the Java installation.
pub const JAVA_HOME_VAR: &str = "JAVA_HOME";

/// `<java_home>/bin/java`, provided it exists.
pub fn java_executable(java_home: &Path) -> Result<PathBuf> {
    let java = java_path(java_home);
    check_java(&java)?;
    Ok(java)
}

/// Fail unless `java` is an existing file.
pub fn check_java(java: &Path) -> Result<()> {
    if !java.is_file() {
        return Err(Error::Configuration(format!(
            "no Java executable at {} (check java_home or {JAVA_HOME_VAR})",
            java.display()
        )));
    }
    Ok(())
}

/// `<java_home>/bin/java` without checking the filesystem.
pub fn java_path(java_home: &Path) -> PathBuf {
    let name = if cfg!(windows) { "java.exe" } else { "java" };
    java_home.join("bin").join(name)
}

/// `JAVA_HOME`, or the directory two levels above `java` on `PATH`.
pub fn locate_java_home() -> Option<PathBuf> {
    if let Some(home) = env::var_os(JAVA_HOME_VAR).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(home));
    }

    let java = which::which("java").ok()?;
    // Follow alternatives-style symlinks to the real installation.
    let java = java.canonicalize().unwrap_or(java);
    let home = java.parent()?.parent()?.to_path_buf();
    debug!("derived Java home {} from PATH", home.display());
    Some(home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_executable_is_a_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let err = java_executable(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("bin"));
    }

    #[test]
    fn finds_executable_under_bin() {
        let tmp = TempDir::new().unwrap();
        let java = java_path(tmp.path());
        fs::create_dir_all(java.parent().unwrap()).unwrap();
        fs::write(&java, "").unwrap();
        assert_eq!(java_executable(tmp.path()).unwrap(), java);
    }
}
