//! Platform definitions: the system bundle, the platform bundles and the
//! packages the system bundle exports.
//!
//! ```toml
//! packages = "org.osgi.framework; version=1.3"
//!
//! [system]
//! url = "https://repo.example/framework-1.0.jar"
//! name = "Example Framework"
//!
//! [[bundle]]
//! url = "https://repo.example/log-1.0.jar"
//! name = "Log Service"
//! profile = "log"
//! start_level = 2
//! ```

use crate::artifact_cache::transport::{parse_location, Transport};
use crate::artifact_cache::ArtifactReference;
use crate::error::{mandatory_str, Error, Result};
use reqwest::Url;
use serde::Deserialize;
use std::io::Read;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionToml {
    system: SystemToml,
    packages: Option<String>,
    #[serde(default, rename = "bundle")]
    bundles: Vec<BundleToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SystemToml {
    url: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BundleToml {
    url: String,
    name: Option<String>,
    profile: Option<String>,
    start_level: Option<u32>,
    #[serde(default)]
    update: bool,
}

/// A platform bundle and the profile that enables it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformBundle {
    pub reference: ArtifactReference,
    /// Always installed when `None`.
    pub profile: Option<String>,
}

/// Parsed platform definition. Read-only after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDefinition {
    system: ArtifactReference,
    packages: Option<String>,
    bundles: Vec<PlatformBundle>,
    profile_start_level: Option<u32>,
}

impl PlatformDefinition {
    /// Parse definition text; `profile_start_level` applies to profile
    /// bundles without their own start level.
    pub fn parse(text: &str, profile_start_level: Option<u32>) -> Result<Self> {
        let parsed: DefinitionToml = toml::from_str(text)
            .map_err(|e| Error::definition("malformed definition", e))?;

        let system = reference(&parsed.system.url, parsed.system.name, "system url")?;
        let bundles = parsed
            .bundles
            .into_iter()
            .map(|bundle| {
                let mut reference = reference(&bundle.url, bundle.name, "bundle url")?;
                reference.start_level = bundle.start_level;
                reference.update = bundle.update;
                Ok(PlatformBundle {
                    reference,
                    profile: bundle
                        .profile
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            system,
            packages: parsed.packages.filter(|p| !p.trim().is_empty()),
            bundles,
            profile_start_level,
        })
    }

    /// Read and parse the definition at `location` (path or URL).
    pub fn load(
        location: &str,
        transport: &dyn Transport,
        profile_start_level: Option<u32>,
    ) -> Result<Self> {
        let url = parse_location(location)
            .map_err(|e| Error::definition(format!("invalid location '{location}'"), e))?;
        debug!("reading platform definition {url}");

        let read = || -> anyhow::Result<String> {
            let mut download = transport.open(&url)?;
            let mut text = String::new();
            download.reader.read_to_string(&mut text)?;
            Ok(text)
        };
        let text = read().map_err(|e| Error::definition(format!("cannot read {url}"), e))?;
        Self::parse(&text, profile_start_level)
    }

    pub fn system(&self) -> &ArtifactReference {
        &self.system
    }

    pub fn packages(&self) -> Option<&str> {
        self.packages.as_deref()
    }

    pub fn bundles(&self) -> &[PlatformBundle] {
        &self.bundles
    }

    /// Bundles without a profile plus those whose profile is listed, in
    /// definition order.
    pub fn platform_bundles(&self, profiles: &[String]) -> Vec<ArtifactReference> {
        self.bundles
            .iter()
            .filter_map(|bundle| match &bundle.profile {
                None => Some(bundle.reference.clone()),
                Some(profile) if profiles.iter().any(|p| p.trim() == profile.as_str()) => {
                    let mut reference = bundle.reference.clone();
                    reference.start_level = reference.start_level.or(self.profile_start_level);
                    Some(reference)
                }
                Some(_) => None,
            })
            .collect()
    }
}

fn reference(url: &str, name: Option<String>, field: &str) -> Result<ArtifactReference> {
    let url = mandatory_str(field, url)?;
    let parsed = Url::parse(url)
        .map_err(|e| Error::definition(format!("invalid {field} '{url}'"), e))?;
    let mut reference = ArtifactReference::new(parsed);
    reference.name = name.filter(|n| !n.trim().is_empty());
    Ok(reference)
}
