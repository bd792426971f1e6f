//! Platform-specific contributions to a launch.

use super::context::LaunchContext;
use crate::artifact_cache::index::escape;
use crate::config::PlatformSettings;
use crate::error::{Error, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// File written by [`ConfiguredPlatformBuilder::prepare`].
pub const FRAMEWORK_PROPERTIES: &str = "framework.properties";

/// What a concrete framework adds to the generic launch sequence.
pub trait PlatformBuilder {
    /// Class started by the JVM. Must not be blank.
    fn main_class_name(&self) -> &str;

    /// Definition text used when no definition location is configured.
    fn default_definition(&self) -> Result<String>;

    /// Profile always added to the configured ones.
    fn required_profile(&self, _context: &LaunchContext) -> Option<String> {
        None
    }

    fn vm_options(&self, _context: &LaunchContext) -> Vec<String> {
        Vec::new()
    }

    fn arguments(&self, _context: &LaunchContext) -> Vec<String> {
        Vec::new()
    }

    /// Materialise framework configuration in the working directory.
    fn prepare(&self, context: &LaunchContext) -> Result<()>;
}

/// Builder driven by the `[platform]` configuration table.
///
/// `prepare` writes `<work>/framework.properties`:
///
/// ```text
/// framework.system.packages=org.osgi.framework, javax.swing
/// framework.bundle.1.location=file:/work/bundles/org.example.log_1.0.jar
/// framework.bundle.1.start_level=2
/// framework.bundle.count=1
/// ```
#[derive(Debug, Clone)]
pub struct ConfiguredPlatformBuilder {
    settings: PlatformSettings,
}

impl ConfiguredPlatformBuilder {
    pub fn new(settings: PlatformSettings) -> Self {
        Self { settings }
    }

    pub fn properties_path(context: &LaunchContext) -> PathBuf {
        context.working_directory().join(FRAMEWORK_PROPERTIES)
    }

    fn render_properties(context: &LaunchContext) -> String {
        let mut out = String::from("#framework configuration\n");
        let mut property = |key: &str, value: &str| {
            let _ = writeln!(out, "{}={}", escape(key, true), escape(value, false));
        };

        property("framework.system.packages", context.system_packages());
        for (i, bundle) in context.bundles().iter().enumerate() {
            let n = i + 1;
            let location = reqwest::Url::from_file_path(&bundle.path)
                .map(String::from)
                .unwrap_or_else(|()| bundle.path.display().to_string());
            property(&format!("framework.bundle.{n}.location"), &location);
            if let Some(level) = bundle.reference.start_level {
                property(
                    &format!("framework.bundle.{n}.start_level"),
                    &level.to_string(),
                );
            }
        }
        property(
            "framework.bundle.count",
            &context.bundles().len().to_string(),
        );
        out
    }
}

impl PlatformBuilder for ConfiguredPlatformBuilder {
    fn main_class_name(&self) -> &str {
        &self.settings.main_class
    }

    fn default_definition(&self) -> Result<String> {
        let path = self.settings.definition.as_ref().ok_or_else(|| {
            Error::Configuration("no platform definition configured".to_string())
        })?;
        fs::read_to_string(path)
            .map_err(|e| Error::definition(format!("cannot read '{}'", path.display()), e))
    }

    fn required_profile(&self, _context: &LaunchContext) -> Option<String> {
        self.settings.required_profile.clone()
    }

    fn vm_options(&self, _context: &LaunchContext) -> Vec<String> {
        self.settings.vm_options.clone()
    }

    fn arguments(&self, _context: &LaunchContext) -> Vec<String> {
        self.settings.arguments.clone()
    }

    fn prepare(&self, context: &LaunchContext) -> Result<()> {
        let path = Self::properties_path(context);
        debug!("writing {}", path.display());
        fs::write(&path, Self::render_properties(context))
            .map_err(|e| Error::io(format!("writing '{}'", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact_cache::{ArtifactReference, CacheIndex, CachedArtifact};
    use crate::config::Configuration;
    use reqwest::Url;
    use tempfile::TempDir;

    #[test]
    fn prepare_lists_packages_and_bundles() {
        let tmp = TempDir::new().unwrap();
        let mut context = LaunchContext::new(Configuration::default(), tmp.path().to_path_buf());
        context.set_system_packages("org.osgi.framework, javax.swing".to_string());

        let bundle_path = tmp.path().join("bundles").join("org.example.log_1.0.jar");
        let mut reference = ArtifactReference::new(Url::parse("https://repo.example/log.jar").unwrap());
        reference.start_level = Some(2);
        context.add_bundles([CachedArtifact {
            path: bundle_path.clone(),
            reference,
        }]);

        let builder = ConfiguredPlatformBuilder::new(PlatformSettings::default());
        builder.prepare(&context).unwrap();

        // The output is a plain properties document.
        let text = fs::read_to_string(ConfiguredPlatformBuilder::properties_path(&context)).unwrap();
        let props = CacheIndex::parse(&text);
        assert_eq!(
            props.get("framework.system.packages"),
            Some("org.osgi.framework, javax.swing")
        );
        assert_eq!(
            props.get("framework.bundle.1.location"),
            Some(Url::from_file_path(&bundle_path).unwrap().as_str())
        );
        assert_eq!(props.get("framework.bundle.1.start_level"), Some("2"));
        assert_eq!(props.get("framework.bundle.count"), Some("1"));
    }

    #[test]
    fn default_definition_requires_a_file() {
        let builder = ConfiguredPlatformBuilder::new(PlatformSettings::default());
        assert_eq!(builder.default_definition().unwrap_err().kind(), "configuration");

        let builder = ConfiguredPlatformBuilder::new(PlatformSettings {
            definition: Some(PathBuf::from("/nonexistent/platform.toml")),
            ..PlatformSettings::default()
        });
        assert_eq!(builder.default_definition().unwrap_err().kind(), "definition");
    }
}
