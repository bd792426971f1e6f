//! Metadata retrieval from a local repository mirror and remote repositories.

use super::settings::Credential;
use super::MetadataSource;
use crate::artifact_cache::transport::open_file;
use anyhow::{bail, Context, Result};
use reqwest::Url;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Maven Central.
pub const CENTRAL_URL: &str = "https://repo1.maven.org/maven2/";

/// A remote repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    pub id: String,
    pub url: Url,
}

impl RemoteRepository {
    /// `url` is normalised to end in `/` so locations join beneath it.
    pub fn new(id: impl Into<String>, url: &str) -> Result<Self> {
        let mut raw = url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).with_context(|| format!("invalid repository URL '{url}'"))?;
        Ok(Self { id: id.into(), url })
    }

    pub fn central() -> Result<Self> {
        Self::new("central", CENTRAL_URL)
    }
}

/// Reads metadata from `<local_repository>/<location>` and from remote
/// repositories in order.
pub struct RepositoryDownloader {
    local_repository: PathBuf,
    remotes: Vec<RemoteRepository>,
    credentials: Vec<Credential>,
    client: reqwest::blocking::Client,
}

impl RepositoryDownloader {
    pub fn new(local_repository: &Path, remotes: Vec<RemoteRepository>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("framework-runner/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            local_repository: local_repository.to_path_buf(),
            remotes,
            credentials: Vec::new(),
            client,
        })
    }

    pub fn with_credentials(mut self, credentials: Vec<Credential>) -> Self {
        self.credentials = credentials;
        self
    }

    /// `~/.m2/repository`, when a home directory is known.
    pub fn default_local_repository() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".m2").join("repository"))
    }

    fn read_from(&self, remote: &RemoteRepository, location: &str) -> Result<String> {
        let url = remote
            .url
            .join(location)
            .with_context(|| format!("joining '{location}' onto {}", remote.url))?;
        debug!("fetching {url}");

        if url.scheme() == "file" {
            let mut text = String::new();
            open_file(&url)?.reader.read_to_string(&mut text)?;
            return Ok(text);
        }

        let mut request = self.client.get(url.clone());
        if let Some(cred) = self.credentials.iter().find(|c| c.id == remote.id) {
            request = request.basic_auth(&cred.username, Some(&cred.password));
        }
        let response = request
            .send()
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .with_context(|| format!("requesting {url}"))?;
        response
            .text()
            .with_context(|| format!("reading body of {url}"))
    }
}

impl MetadataSource for RepositoryDownloader {
    fn read_local(&self, location: &str) -> Result<String> {
        let path = self.local_repository.join(location);
        fs::read_to_string(&path).with_context(|| format!("reading '{}'", path.display()))
    }

    fn read_remote(&self, location: &str) -> Result<String> {
        let mut last_error = None;
        for remote in &self.remotes {
            match self.read_from(remote, location) {
                Ok(text) => return Ok(text),
                Err(err) => {
                    debug!("{} does not provide {location}: {err:#}", remote.id);
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => bail!("no remote repositories configured for '{location}'"),
        }
    }
}
