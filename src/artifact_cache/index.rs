//! URL-to-filename index persisted next to the cached bundles.
//!
//! The file is a flat properties document (`key=value` per line, `#` comments,
//! `\` escapes for separators in keys), so it stays readable and editable by
//! hand and by the tools that wrote earlier caches.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// File name of the index inside the bundles directory.
pub const INDEX_FILE_NAME: &str = "downloaded_bundles.properties";

/// In-memory view of the cache index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheIndex {
    entries: BTreeMap<String, String>,
}

impl CacheIndex {
    /// Load the index; a missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading cache index '{}'", path.display()))?;
        Ok(Self::parse(&text))
    }

    /// Load the index, treating any read failure as an empty index.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(index) => index,
            Err(err) => {
                tracing::warn!("ignoring unreadable cache index: {err:#}");
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in logical_lines(text) {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                continue;
            }
            let (key, value) = split_entry(trimmed);
            entries.insert(key, value);
        }
        Self { entries }
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    pub fn insert(&mut self, url: &str, file_name: &str) {
        self.entries.insert(url.to_string(), file_name.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the properties text.
    pub fn render(&self) -> String {
        let mut out = String::from("#downloaded bundles\n");
        for (key, value) in &self.entries {
            out.push_str(&escape(key, true));
            out.push('=');
            out.push_str(&escape(value, false));
            out.push('\n');
        }
        out
    }

    /// Persist the index via a temporary sibling and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating index directory '{}'", parent.display()))?;
        }
        let tmp = path.with_extension("properties.tmp");
        fs::write(&tmp, self.render())
            .with_context(|| format!("writing cache index '{}'", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| {
            format!(
                "renaming cache index '{}' -> '{}'",
                tmp.display(),
                path.display()
            )
        })?;
        Ok(())
    }
}

/// Join physical lines ending in an odd number of backslashes.
fn logical_lines(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut continuing = false;
    for raw in text.lines() {
        let piece = if continuing { raw.trim_start() } else { raw };
        let trailing = piece.chars().rev().take_while(|c| *c == '\\').count();
        if trailing % 2 == 1 {
            current.push_str(&piece[..piece.len() - 1]);
            continuing = true;
            continue;
        }
        current.push_str(piece);
        out.push(std::mem::take(&mut current));
        continuing = false;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn split_entry(line: &str) -> (String, String) {
    let mut key = String::new();
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    key.push(unescape_char(next));
                }
            }
            '=' | ':' => break,
            c if c.is_whitespace() => {
                while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
                    chars.next();
                }
                if matches!(chars.peek(), Some('=') | Some(':')) {
                    chars.next();
                }
                break;
            }
            c => key.push(c),
        }
    }
    let rest: String = chars.collect();
    (key, unescape(rest.trim_start()))
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(unescape_char(next));
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn unescape_char(c: char) -> char {
    match c {
        't' => '\t',
        'n' => '\n',
        'r' => '\r',
        'f' => '\u{c}',
        other => other,
    }
}

pub(crate) fn escape(value: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let index = CacheIndex::load(&tmp.path().join(INDEX_FILE_NAME)).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn url_keys_survive_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bundles").join(INDEX_FILE_NAME);

        let mut index = CacheIndex::default();
        index.insert("http://repo.example/a/b-1.0.jar", "org.example.b_1.0.jar");
        index.insert("file:/tmp/x y.jar", "x_0.0.0.jar");
        index.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("http\\://repo.example/a/b-1.0.jar=org.example.b_1.0.jar"));

        let loaded = CacheIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn parses_hand_written_properties() {
        let index = CacheIndex::parse(
            "# comment\n! other comment\n\nfile\\:/a.jar = a_1.0.jar\nlong\\\n    key: value\n",
        );
        assert_eq!(index.get("file:/a.jar"), Some("a_1.0.jar"));
        assert_eq!(index.get("longkey"), Some("value"));
        assert_eq!(index.len(), 2);
    }
}
