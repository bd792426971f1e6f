//! Jar manifest inspection and canonical file naming.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const BUNDLE_SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
pub const BUNDLE_NAME: &str = "Bundle-Name";
pub const BUNDLE_VERSION: &str = "Bundle-Version";

/// Version used when a bundle declares none.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Outcome of validating a file in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid { canonical_name: String },
    Invalid { reason: String },
}

/// Main-section attributes of a jar manifest.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    attributes: Vec<(String, String)>,
}

impl Manifest {
    /// Parse manifest text: `Name: value` headers, continuation lines start
    /// with a single space, the main section ends at the first blank line.
    pub fn parse(text: &str) -> Result<Self> {
        let mut attributes: Vec<(String, String)> = Vec::new();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix(' ') {
                match attributes.last_mut() {
                    Some((_, value)) => value.push_str(rest),
                    None => bail!("manifest starts with a continuation line"),
                }
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                bail!("malformed manifest header '{line}'");
            };
            let name = name.trim();
            if name.is_empty() {
                bail!("manifest header without a name");
            }
            attributes.push((
                name.to_string(),
                value.strip_prefix(' ').unwrap_or(value).to_string(),
            ));
        }
        Ok(Self { attributes })
    }

    /// Attribute lookup; header names compare case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Read the manifest from a jar; `Ok(None)` when the archive has none.
pub fn read_manifest(path: &Path) -> Result<Option<Manifest>> {
    let file = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("'{}' is not a zip archive", path.display()))?;
    let mut entry = match archive.by_name(MANIFEST_PATH) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("reading manifest of '{}'", path.display()))
        }
    };
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("reading manifest of '{}'", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    Manifest::parse(&text).map(Some)
}

/// Compute the canonical cache name from manifest attributes.
pub fn canonical_name(symbolic_name: Option<&str>, version: Option<&str>, default_name: &str) -> String {
    let name = symbolic_name
        .map(|raw| raw.split(';').next().unwrap_or(raw).trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(default_name);
    let version = version
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_VERSION);
    format!("{name}_{version}.jar")
}

/// True when `name` names a file directly inside the cache directory.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', ':', '\0'])
}

/// Validate a cached jar and derive its canonical file name.
pub fn validate_bundle(path: &Path, default_name: &str, check_attributes: bool) -> Validation {
    let manifest = match read_manifest(path) {
        Ok(Some(manifest)) => manifest,
        Ok(None) => {
            return Validation::Invalid {
                reason: "is not a valid bundle (no manifest)".to_string(),
            }
        }
        Err(err) => {
            return Validation::Invalid {
                reason: format!("is not a valid bundle ({err:#})"),
            }
        }
    };

    let symbolic_name = manifest.get(BUNDLE_SYMBOLIC_NAME);
    if check_attributes && symbolic_name.is_none() && manifest.get(BUNDLE_NAME).is_none() {
        return Validation::Invalid {
            reason: format!(
                "is not a valid bundle (neither {BUNDLE_SYMBOLIC_NAME} nor {BUNDLE_NAME} is set)"
            ),
        };
    }

    let canonical_name = canonical_name(symbolic_name, manifest.get(BUNDLE_VERSION), default_name);
    if !is_plain_file_name(&canonical_name) {
        return Validation::Invalid {
            reason: format!("is not a valid bundle (unusable file name '{canonical_name}')"),
        };
    }
    Validation::Valid { canonical_name }
}
