//! Repository credentials from a user `settings.xml`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Username/password for one `<server>` entry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `~/.m2/settings.xml`, when a home directory is known.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".m2").join("settings.xml"))
}

/// Read `<server>` credentials; a missing file yields none.
pub fn load_credentials(path: &Path) -> Result<Vec<Credential>> {
    if !path.is_file() {
        tracing::info!(
            "could not find {} for authentication information, skipping",
            path.display()
        );
        return Ok(Vec::new());
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("reading '{}'", path.display()))?;
    parse_credentials(&text).with_context(|| format!("parsing '{}'", path.display()))
}

pub fn parse_credentials(xml: &str) -> Result<Vec<Credential>> {
    let doc = roxmltree::Document::parse(xml)?;
    let credentials = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "server")
        .map(|server| {
            let child = |name: &str| {
                server
                    .children()
                    .find(|c| c.is_element() && c.tag_name().name() == name)
                    .and_then(|c| c.text())
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default()
            };
            Credential {
                id: child("id"),
                username: child("username"),
                password: child("password"),
            }
        })
        .collect();
    Ok(credentials)
}
