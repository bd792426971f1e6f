//! State accumulated during one launch and handed to the platform builder.

use crate::artifact_cache::CachedArtifact;
use crate::config::Configuration;
use std::path::{Path, PathBuf};

/// Everything a builder may need to prepare the platform.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    configuration: Configuration,
    working_directory: PathBuf,
    system_artifact: Option<PathBuf>,
    bundles: Vec<CachedArtifact>,
    system_packages: String,
}

impl LaunchContext {
    pub fn new(configuration: Configuration, working_directory: PathBuf) -> Self {
        Self {
            configuration,
            working_directory,
            system_artifact: None,
            bundles: Vec::new(),
            system_packages: String::new(),
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn set_working_directory(&mut self, working_directory: PathBuf) {
        self.working_directory = working_directory;
    }

    /// The cached system artifact, once fetched.
    pub fn system_artifact(&self) -> Option<&Path> {
        self.system_artifact.as_deref()
    }

    pub fn set_system_artifact(&mut self, path: PathBuf) {
        self.system_artifact = Some(path);
    }

    /// Platform bundles followed by user bundles, in install order.
    pub fn bundles(&self) -> &[CachedArtifact] {
        &self.bundles
    }

    pub fn add_bundles(&mut self, bundles: impl IntoIterator<Item = CachedArtifact>) {
        self.bundles.extend(bundles);
    }

    /// Comma separated packages exported by the system bundle.
    pub fn system_packages(&self) -> &str {
        &self.system_packages
    }

    pub fn set_system_packages(&mut self, packages: String) {
        self.system_packages = packages;
    }
}
