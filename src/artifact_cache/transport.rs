//! Byte sources for artifact URLs.
//!
//! `file:` URLs are read straight from disk; `http:`/`https:` go through a
//! blocking HTTP client.

use anyhow::{bail, Context, Result};
use reqwest::Url;
use std::fs::File;
use std::io::Read;
use std::time::Duration;

/// An opened artifact stream.
pub struct Download {
    pub reader: Box<dyn Read + Send>,
    /// Total size when the source announces it.
    pub length: Option<u64>,
}

/// Opens artifact URLs for reading.
pub trait Transport: Send + Sync {
    fn open(&self, url: &Url) -> Result<Download>;
}

/// Transport handling `file:` and `http(s):` URLs.
pub struct DefaultTransport {
    client: reqwest::blocking::Client,
}

impl DefaultTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("framework-runner/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for DefaultTransport {
    fn open(&self, url: &Url) -> Result<Download> {
        match url.scheme() {
            "file" => open_file(url),
            "http" | "https" => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .with_context(|| format!("requesting {url}"))?
                    .error_for_status()
                    .with_context(|| format!("requesting {url}"))?;
                let length = response.content_length();
                Ok(Download {
                    reader: Box::new(response),
                    length,
                })
            }
            other => bail!("unsupported URL scheme '{other}' in {url}"),
        }
    }
}

/// Open a `file:` URL.
pub fn open_file(url: &Url) -> Result<Download> {
    let path = url
        .to_file_path()
        .map_err(|()| anyhow::anyhow!("{url} does not name a local file"))?;
    let file = File::open(&path).with_context(|| format!("opening '{}'", path.display()))?;
    let length = file.metadata().ok().map(|m| m.len());
    Ok(Download {
        reader: Box::new(file),
        length,
    })
}

/// Parse a location that is either a URL or a filesystem path.
pub fn parse_location(location: &str) -> Result<Url> {
    let trimmed = location.trim();
    if let Ok(url) = Url::parse(trimmed) {
        // Single-letter schemes are Windows drive letters, not URLs.
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }
    let path = std::path::Path::new(trimmed);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("resolving current directory")?
            .join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|()| anyhow::anyhow!("'{trimmed}' is neither a URL nor a usable path"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn opens_file_urls() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        std::fs::write(&path, b"abc").unwrap();

        let url = Url::from_file_path(&path).unwrap();
        let mut download = open_file(&url).unwrap();
        assert_eq!(download.length, Some(3));
        let mut buf = Vec::new();
        download.reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"abc");
    }

    #[test]
    fn plain_paths_become_file_urls() {
        let url = parse_location("/opt/defs/platform.toml").unwrap();
        assert_eq!(url.scheme(), "file");
        assert_eq!(
            parse_location("https://repo.example/x.jar").unwrap().as_str(),
            "https://repo.example/x.jar"
        );
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let transport = DefaultTransport::new().unwrap();
        let url = Url::parse("ftp://repo.example/x.jar").unwrap();
        assert!(transport.open(&url).is_err());
    }
}
