//! The assembled Java invocation.

use crate::error::{mandatory, Result};
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable holding extra space separated program arguments.
pub const FRAMEWORK_OPTS_VAR: &str = "FRAMEWORK_OPTS";

/// Everything needed to start the platform JVM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchCommand {
    /// `<java home>/bin/java`; unset when no Java home could be found.
    pub java: Option<PathBuf>,
    /// Configured options followed by the builder's.
    pub vm_options: Vec<String>,
    /// System artifact path with the configured suffix appended.
    pub classpath: String,
    pub main_class: String,
    /// Builder arguments followed by `FRAMEWORK_OPTS`.
    pub arguments: Vec<String>,
    pub working_directory: PathBuf,
}

impl LaunchCommand {
    /// The Java executable, required only when spawning a process.
    pub fn java(&self) -> Result<&Path> {
        mandatory("JAVA_HOME", self.java.as_deref())
    }

    /// `java <vm options> -cp <classpath> <main class> <arguments>`.
    pub fn to_command_line(&self) -> Result<Vec<String>> {
        let mut line = Vec::with_capacity(self.vm_options.len() + self.arguments.len() + 4);
        line.push(self.java()?.to_string_lossy().into_owned());
        line.extend(self.vm_options.iter().cloned());
        line.push("-cp".to_string());
        line.push(self.classpath.clone());
        line.push(self.main_class.clone());
        line.extend(self.arguments.iter().cloned());
        Ok(line)
    }

    /// The class path split into its entries.
    pub fn classpath_entries(&self) -> Vec<String> {
        env::split_paths(&self.classpath)
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .collect()
    }
}

/// `FRAMEWORK_OPTS` split on spaces; empty when unset.
pub fn framework_options() -> Vec<String> {
    split_options(env::var(FRAMEWORK_OPTS_VAR).ok().as_deref())
}

fn split_options(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(' ')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
