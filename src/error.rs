//! Error types for the provisioning and launch pipeline.

use std::path::PathBuf;

/// Result type alias for launcher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by error variants.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the launcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A mandatory setting or collaborator value is missing or empty.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An artifact could not be downloaded, validated, or stored.
    #[error("[{url}] {reason}")]
    Artifact {
        url: String,
        reason: String,
        #[source]
        source: Option<Cause>,
    },

    /// The system package list could not be assembled.
    #[error("package resolution failed: {reason}")]
    PackageResolution {
        reason: String,
        #[source]
        source: Option<Cause>,
    },

    /// Neither the local nor the remote metadata could be retrieved.
    #[error("{reason}")]
    VersionResolution {
        reason: String,
        #[source]
        source: Option<Cause>,
    },

    /// A metadata document did not contain the queried element.
    #[error("metadata query '{path}' failed: {reason}")]
    MetadataQuery { path: String, reason: String },

    /// The platform process could not be started or supervised.
    #[error("could not run platform process in {}: {reason}", working_dir.display())]
    Process {
        working_dir: PathBuf,
        reason: String,
        #[source]
        source: Option<Cause>,
    },

    /// The platform definition could not be read or parsed.
    #[error("invalid platform definition: {reason}")]
    Definition {
        reason: String,
        #[source]
        source: Option<Cause>,
    },

    /// Filesystem failure outside of artifact handling.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn artifact(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Artifact {
            url: url.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn artifact_caused(
        url: impl Into<String>,
        reason: impl Into<String>,
        source: impl Into<Cause>,
    ) -> Self {
        Self::Artifact {
            url: url.into(),
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn packages(reason: impl Into<String>, source: Option<Cause>) -> Self {
        Self::PackageResolution {
            reason: reason.into(),
            source,
        }
    }

    pub(crate) fn definition(reason: impl Into<String>, source: impl Into<Cause>) -> Self {
        Self::Definition {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Short machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Artifact { .. } => "artifact",
            Self::PackageResolution { .. } => "package_resolution",
            Self::VersionResolution { .. } => "version_resolution",
            Self::MetadataQuery { .. } => "metadata_query",
            Self::Process { .. } => "process",
            Self::Definition { .. } => "definition",
            Self::Io { .. } => "io",
        }
    }
}

/// Reject a missing or blank value with a configuration error naming it.
pub(crate) fn mandatory<T>(name: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| Error::Configuration(format!("{name} cannot be empty")))
}

/// Reject a blank string with a configuration error naming it.
pub(crate) fn mandatory_str<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Configuration(format!("{name} cannot be empty")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn artifact_error_names_url() {
        let err = Error::artifact("http://repo/a.jar", "is not a valid bundle");
        assert_eq!(err.to_string(), "[http://repo/a.jar] is not a valid bundle");
        assert_eq!(err.kind(), "artifact");
    }

    #[test]
    fn caused_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::artifact_caused("file:/x.jar", "could not be downloaded", io);
        assert_eq!(err.source().unwrap().to_string(), "gone");
    }

    #[test]
    fn mandatory_rejects_blank() {
        assert!(mandatory_str("Main class", "   ").is_err());
        assert_eq!(mandatory_str("Main class", " a.B ").unwrap(), "a.B");
        assert!(mandatory::<u8>("Working dir", None).is_err());
    }
}
