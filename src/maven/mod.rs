//! Symbolic version resolution against repository metadata.
//!
//! `LATEST` resolves to the last `<version>` listed in
//! `<group>/<artifact>/maven-metadata.xml`; a `SNAPSHOT` version resolves to
//! the timestamped build named in `<group>/<artifact>/<version>/maven-metadata.xml`.
//!
//! Both look for the `-local.xml` variant written by a local repository first
//! and only go remote when that is absent.

pub mod downloader;
pub mod settings;
pub mod xml_path;

use crate::error::{Error, Result};
use tracing::debug;

pub use downloader::{RemoteRepository, RepositoryDownloader};
pub use settings::Credential;

const METADATA_FILE: &str = "maven-metadata.xml";
const LATEST_VERSION_PATH: &str = "versioning/versions/version[last]";
const SNAPSHOT_TIMESTAMP_PATH: &str = "versioning/snapshot/timestamp";
const SNAPSHOT_BUILD_NUMBER_PATH: &str = "versioning/snapshot/buildNumber";
const SNAPSHOT_TOKEN: &str = "SNAPSHOT";

/// Where metadata documents come from.
pub trait MetadataSource {
    /// Read `location` from the local repository mirror.
    fn read_local(&self, location: &str) -> anyhow::Result<String>;
    /// Read `location` from the remote repositories.
    fn read_remote(&self, location: &str) -> anyhow::Result<String>;
}

impl<S: MetadataSource + ?Sized> MetadataSource for &S {
    fn read_local(&self, location: &str) -> anyhow::Result<String> {
        (**self).read_local(location)
    }

    fn read_remote(&self, location: &str) -> anyhow::Result<String> {
        (**self).read_remote(location)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Local,
    Remote,
}

/// Resolves `LATEST` and `SNAPSHOT` versions.
pub struct VersionResolver<S> {
    source: S,
}

impl<S: MetadataSource> VersionResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// The newest version published for `group:artifact`.
    pub fn resolve_latest(&self, group: &str, artifact: &str) -> Result<String> {
        let location = format!("{}/{artifact}/{METADATA_FILE}", group_path(group));
        let (xml, _) = self.fetch(&location).map_err(|e| Error::VersionResolution {
            reason: format!("unable to retrieve LATEST version of [{group}:{artifact}]"),
            source: Some(e.into()),
        })?;
        xml_path::query_text(&xml, LATEST_VERSION_PATH)
    }

    /// The timestamped build behind a `SNAPSHOT` version.
    ///
    /// Local metadata and documents without snapshot information leave
    /// `version` unchanged.
    pub fn resolve_snapshot(&self, group: &str, artifact: &str, version: &str) -> Result<String> {
        let location = format!("{}/{artifact}/{version}/{METADATA_FILE}", group_path(group));
        let (xml, origin) = self.fetch(&location).map_err(|e| Error::VersionResolution {
            reason: format!("unable to retrieve SNAPSHOT version of [{group}:{artifact}/{version}]"),
            source: Some(e.into()),
        })?;

        if origin == Origin::Local || !version.contains(SNAPSHOT_TOKEN) {
            return Ok(version.to_string());
        }

        let stamp = xml_path::query_text(&xml, SNAPSHOT_TIMESTAMP_PATH).and_then(|timestamp| {
            let build = xml_path::query_text(&xml, SNAPSHOT_BUILD_NUMBER_PATH)?;
            Ok(format!("{timestamp}-{build}"))
        });
        match stamp {
            Ok(stamp) => Ok(version.replace(SNAPSHOT_TOKEN, &stamp)),
            Err(err) => {
                debug!("keeping {version}: {err}");
                Ok(version.to_string())
            }
        }
    }

    fn fetch(&self, location: &str) -> anyhow::Result<(String, Origin)> {
        let local = local_variant(location);
        match self.source.read_local(&local) {
            Ok(xml) => return Ok((xml, Origin::Local)),
            Err(err) => debug!("no local metadata at {local}: {err:#}"),
        }
        self.source
            .read_remote(location)
            .map(|xml| (xml, Origin::Remote))
    }
}

fn group_path(group: &str) -> String {
    group.replace('.', "/")
}

fn local_variant(location: &str) -> String {
    match location.strip_suffix(".xml") {
        Some(stem) => format!("{stem}-local.xml"),
        None => location.to_string(),
    }
}
