//! Launch configuration loaded from TOML.
//!
//! ```toml
//! working_directory = "runner"
//! execution_environment = "J2SE-1.5"
//! vm_options = ["-Xmx256m"]
//! profiles = ["log"]
//! bundles = ["file:/opt/bundles/app.jar"]
//!
//! [[repository]]
//! id = "central"
//! url = "https://repo1.maven.org/maven2/"
//!
//! [platform]
//! main_class = "org.example.framework.Main"
//! definition = "platform.toml"
//! ```

use crate::artifact_cache::ProgressMode;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default directory bundles are cached and the platform is run in.
pub const DEFAULT_WORKING_DIRECTORY: &str = "runner";
/// Execution environment used when none is configured.
pub const DEFAULT_EXECUTION_ENVIRONMENT: &str = "J2SE-1.5";

/// Settings for one launch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    pub working_directory: PathBuf,
    /// Re-download every bundle.
    pub overwrite: bool,
    pub overwrite_user_bundles: bool,
    pub overwrite_system_bundles: bool,
    pub download_feedback: ProgressMode,
    /// Comma separated execution environment names or URLs, or `NONE`.
    pub execution_environment: String,
    /// Extra comma separated packages exported by the system bundle.
    pub system_packages: Option<String>,
    pub vm_options: Vec<String>,
    /// Appended verbatim to the system artifact path on the class path.
    pub classpath: String,
    pub java_home: Option<PathBuf>,
    /// Remove the working directory before launching.
    pub clean_start: bool,
    pub profiles: Vec<String>,
    /// Start level for profile bundles that do not declare one.
    pub profile_start_level: Option<u32>,
    /// Platform definition path or URL; the builder default when unset.
    pub definition: Option<String>,
    /// User bundle locations, installed after the platform bundles.
    pub bundles: Vec<String>,
    #[serde(rename = "repository")]
    pub repositories: Vec<RepositorySettings>,
    pub local_repository: Option<PathBuf>,
    pub platform: PlatformSettings,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            working_directory: PathBuf::from(DEFAULT_WORKING_DIRECTORY),
            overwrite: false,
            overwrite_user_bundles: false,
            overwrite_system_bundles: false,
            download_feedback: ProgressMode::default(),
            execution_environment: DEFAULT_EXECUTION_ENVIRONMENT.to_string(),
            system_packages: None,
            vm_options: Vec::new(),
            classpath: String::new(),
            java_home: None,
            clean_start: false,
            profiles: Vec::new(),
            profile_start_level: None,
            definition: None,
            bundles: Vec::new(),
            repositories: Vec::new(),
            local_repository: None,
            platform: PlatformSettings::default(),
        }
    }
}

/// A remote repository used for version resolution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositorySettings {
    pub id: String,
    pub url: String,
}

/// Settings consumed by the bundled platform builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformSettings {
    pub main_class: String,
    pub vm_options: Vec<String>,
    pub arguments: Vec<String>,
    pub required_profile: Option<String>,
    /// Default platform definition file, relative to the configuration file.
    pub definition: Option<PathBuf>,
}

impl Configuration {
    /// Load from a TOML file; relative paths inside resolve against its
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading configuration '{}'", path.display()))?;
        let mut config = Self::parse(&text)
            .with_context(|| format!("parsing configuration '{}'", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.working_directory);
        if let Some(definition) = self.platform.definition.as_mut() {
            resolve(definition);
        }
        if let Some(local) = self.local_repository.as_mut() {
            resolve(local);
        }
    }

    /// Configured Java home, else `JAVA_HOME`, else two levels above the
    /// `java` found on `PATH`.
    pub fn java_home(&self) -> Option<PathBuf> {
        self.java_home
            .clone()
            .or_else(crate::preflight::locate_java_home)
    }

    pub fn overwrite_system(&self) -> bool {
        self.overwrite || self.overwrite_system_bundles
    }

    pub fn overwrite_user(&self) -> bool {
        self.overwrite || self.overwrite_user_bundles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Configuration::parse("").unwrap();
        assert_eq!(config, Configuration::default());
        assert_eq!(config.working_directory, PathBuf::from("runner"));
        assert_eq!(config.execution_environment, "J2SE-1.5");
        assert_eq!(config.download_feedback, ProgressMode::Coarse);
    }

    #[test]
    fn parses_all_sections() {
        let config = Configuration::parse(
            r#"
            overwrite_user_bundles = true
            download_feedback = "fine"
            execution_environment = "NONE"
            vm_options = ["-Xmx64m"]
            classpath = ":extra.jar"
            profiles = ["log", "web"]
            profile_start_level = 4
            bundles = ["file:/tmp/a.jar"]

            [[repository]]
            id = "internal"
            url = "https://repo.example/maven"

            [platform]
            main_class = "org.example.Main"
            arguments = ["-console"]
            "#,
        )
        .unwrap();

        assert!(config.overwrite_user());
        assert!(!config.overwrite_system());
        assert_eq!(config.download_feedback, ProgressMode::Fine);
        assert_eq!(config.profiles, ["log", "web"]);
        assert_eq!(config.profile_start_level, Some(4));
        assert_eq!(config.repositories[0].id, "internal");
        assert_eq!(config.platform.main_class, "org.example.Main");
        assert_eq!(config.platform.arguments, ["-console"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Configuration::parse("overwrite_everything = true").is_err());
        assert!(Configuration::parse("[platform]\nmain = \"x\"").is_err());
    }

    #[test]
    fn load_resolves_paths_against_config_dir() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("runner.toml");
        fs::write(
            &path,
            "working_directory = \"work\"\n[platform]\ndefinition = \"platform.toml\"\n",
        )
        .unwrap();

        let config = Configuration::load(&path).unwrap();
        assert_eq!(config.working_directory, tmp.path().join("work"));
        assert_eq!(
            config.platform.definition,
            Some(tmp.path().join("platform.toml"))
        );
    }

    #[test]
    fn explicit_java_home_wins() {
        let config = Configuration {
            java_home: Some(PathBuf::from("/opt/jdk")),
            ..Configuration::default()
        };
        assert_eq!(config.java_home(), Some(PathBuf::from("/opt/jdk")));
    }
}
