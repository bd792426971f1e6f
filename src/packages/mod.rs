//! System package list assembly.
//!
//! The launched framework exports the packages of the configured execution
//! environments from its system bundle, followed by any packages the user
//! and the platform definition declare.
//!
//! ```text
//! ee = "J2SE-1.5,file:/opt/extra.packages"
//!        │          │
//!        │          └── read through the transport
//!        └── bundled table (case-insensitive)
//! ```

use crate::artifact_cache::Transport;
use crate::error::{Error, Result};
use reqwest::Url;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::sync::Arc;
use tracing::info;

/// Token disabling execution-environment packages.
pub const NO_EXECUTION_ENVIRONMENT: &str = "NONE";

const PACKAGE_SEPARATOR: &str = ", ";

/// A package list resource for one execution environment.
#[derive(Debug, Clone)]
pub struct EnvironmentResource {
    /// Location relative to the bundled `ee/` root.
    pub location: Cow<'static, str>,
    pub contents: Cow<'static, str>,
}

/// Immutable lookup table of known execution environments.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEnvironments {
    entries: BTreeMap<String, EnvironmentResource>,
}

macro_rules! bundled {
    ($location:literal) => {
        ($location, include_str!(concat!("ee/", $location)))
    };
}

const BUNDLED: &[(&str, (&str, &str))] = &[
    ("CDC-1.0/Foundation-1.0", bundled!("CDC-1.0/Foundation-1.0.packages")),
    ("OSGi/Minimum-1.1", bundled!("OSGi/Minimum-1.1.packages")),
    ("JRE-1.1", bundled!("JRE-1.1.packages")),
    ("J2SE-1.2", bundled!("J2SE-1.2.packages")),
    ("J2SE-1.3", bundled!("J2SE-1.3.packages")),
    ("J2SE-1.4", bundled!("J2SE-1.4.packages")),
    ("J2SE-1.5", bundled!("J2SE-1.5.packages")),
    ("J2SE-1.6", bundled!("JavaSE-1.6.packages")),
    ("JavaSE-1.6", bundled!("JavaSE-1.6.packages")),
    ("PersonalJava-1.1", bundled!("PersonalJava-1.1.packages")),
    ("PersonalJava-1.2", bundled!("PersonalJava-1.2.packages")),
    ("CDC-1.0/PersonalBasis-1.0", bundled!("CDC-1.0/PersonalBasis-1.0.packages")),
    ("CDC-1.0/PersonalJava-1.0", bundled!("CDC-1.0/PersonalJava-1.0.packages")),
];

impl ExecutionEnvironments {
    /// The environments shipped with the launcher.
    pub fn bundled() -> Self {
        BUNDLED
            .iter()
            .fold(Self::default(), |table, (name, (location, contents))| {
                table.with(*name, *location, *contents)
            })
    }

    /// Add or replace an environment.
    pub fn with(
        mut self,
        name: &str,
        location: impl Into<Cow<'static, str>>,
        contents: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.entries.insert(
            name.to_ascii_uppercase(),
            EnvironmentResource {
                location: location.into(),
                contents: contents.into(),
            },
        );
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&EnvironmentResource> {
        self.entries.get(&name.trim().to_ascii_uppercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Builds the comma separated system package list.
pub struct PackageListAggregator {
    environments: ExecutionEnvironments,
    transport: Arc<dyn Transport>,
}

impl PackageListAggregator {
    pub fn new(environments: ExecutionEnvironments, transport: Arc<dyn Transport>) -> Self {
        Self {
            environments,
            transport,
        }
    }

    /// Execution environment packages, then `user_packages`, then
    /// `platform_packages`; empty groups are skipped.
    pub fn build_package_list(
        &self,
        execution_environment: &str,
        user_packages: Option<&str>,
        platform_packages: Option<&str>,
    ) -> Result<String> {
        let mut groups: Vec<String> = Vec::new();

        if !execution_environment
            .trim()
            .eq_ignore_ascii_case(NO_EXECUTION_ENVIRONMENT)
        {
            let packages = self.environment_packages(execution_environment)?;
            if !packages.is_empty() {
                groups.push(packages.join(PACKAGE_SEPARATOR));
            }
        }

        for extra in [user_packages, platform_packages].into_iter().flatten() {
            let extra = extra.trim();
            if !extra.is_empty() {
                groups.push(extra.to_string());
            }
        }

        Ok(groups.join(PACKAGE_SEPARATOR))
    }

    /// Union of all segments' packages in first-seen order.
    fn environment_packages(&self, execution_environment: &str) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut packages = Vec::new();
        for segment in execution_environment.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let contents = self.read_environment(segment)?;
            for line in contents.lines() {
                let line = line.trim();
                if !line.is_empty() && seen.insert(line.to_string()) {
                    packages.push(line.to_string());
                }
            }
        }
        Ok(packages)
    }

    fn read_environment(&self, segment: &str) -> Result<Cow<'_, str>> {
        if let Some(resource) = self.environments.lookup(segment) {
            info!("execution environment [{segment}] ({})", resource.location);
            return Ok(Cow::Borrowed(resource.contents.as_ref()));
        }

        let url = Url::parse(segment).map_err(|e| {
            Error::packages(
                format!("execution environment [{segment}] could not be found"),
                Some(e.into()),
            )
        })?;
        info!("execution environment [{url}]");

        let read = || -> anyhow::Result<String> {
            let mut download = self.transport.open(&url)?;
            let mut text = String::new();
            download.reader.read_to_string(&mut text)?;
            Ok(text)
        };
        read().map(Cow::Owned).map_err(|e| {
            Error::packages(
                format!("could not read packages from execution environment [{segment}]"),
                Some(e.into()),
            )
        })
    }
}
