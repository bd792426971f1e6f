//! Working-directory bundle cache.
//!
//! Layout:
//!
//! ```text
//! <work_dir>/bundles/
//! ├── downloaded_bundles.properties   URL -> file name
//! ├── .lock                           held while a launch uses the cache
//! └── <symbolic-name>_<version>.jar
//! ```
//!
//! A fetched file first lands under a name derived from the URL hash. Once its
//! manifest has been read it is renamed to its canonical
//! `<symbolic-name>_<version>.jar` name and the index remembers the mapping,
//! so the next run can validate the existing file without touching the
//! network. Index entries pointing at missing or invalid files are not
//! purged; they simply trigger a fresh download.

pub mod index;
pub mod manifest;
pub mod progress;
pub mod transport;

use crate::error::{Error, Result};
use fs2::FileExt;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub use index::CacheIndex;
pub use manifest::Validation;
pub use progress::{Console, ProgressMode};
pub use transport::{DefaultTransport, Download, Transport};

/// Directory under the working directory holding cached bundles.
pub const BUNDLES_DIR: &str = "bundles";
const LOCK_FILE_NAME: &str = ".lock";

/// A bundle to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    pub url: Url,
    pub name: Option<String>,
    /// Re-download even when a valid cached copy exists.
    pub update: bool,
    pub start_level: Option<u32>,
}

impl ArtifactReference {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            name: None,
            update: false,
            start_level: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.url.as_str())
    }
}

/// A validated bundle in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub path: PathBuf,
    pub reference: ArtifactReference,
}

/// Bundle cache rooted at `<work_dir>/bundles`.
///
/// Holds an exclusive advisory lock on the directory for its lifetime.
pub struct ArtifactCache {
    bundles_dir: PathBuf,
    transport: Arc<dyn Transport>,
    progress: ProgressMode,
    console: Console,
    _lock: File,
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("bundles_dir", &self.bundles_dir)
            .field("progress", &self.progress)
            .finish()
    }
}

impl ArtifactCache {
    /// Open (and create if needed) the cache under `work_dir`.
    pub fn open(work_dir: &Path, transport: Arc<dyn Transport>) -> Result<Self> {
        let bundles_dir = work_dir.join(BUNDLES_DIR);
        fs::create_dir_all(&bundles_dir).map_err(|e| {
            Error::io(
                format!("creating bundle cache '{}'", bundles_dir.display()),
                e,
            )
        })?;

        // The lock file is never unlinked: removing a still-locked file would
        // let a second process lock a fresh inode at the same path.
        let lock_path = bundles_dir.join(LOCK_FILE_NAME);
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| Error::io(format!("creating lock file '{}'", lock_path.display()), e))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(Error::Configuration(format!(
                "bundle cache {} is in use by another launch",
                bundles_dir.display()
            )));
        }

        Ok(Self {
            bundles_dir,
            transport,
            progress: ProgressMode::Silent,
            console: Console::default(),
            _lock: lock,
        })
    }

    pub fn with_progress(mut self, progress: ProgressMode) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Remove every cached bundle and the index; the lock stays held.
    pub fn clear(&self) -> Result<()> {
        let failed = |path: &Path, e| Error::io(format!("clearing '{}'", path.display()), e);
        let entries = fs::read_dir(&self.bundles_dir).map_err(|e| failed(&self.bundles_dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| failed(&self.bundles_dir, e))?.path();
            if path.file_name() == Some(OsStr::new(LOCK_FILE_NAME)) {
                continue;
            }
            let removed = if path.is_dir() && !path.is_symlink() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|e| failed(&path, e))?;
        }
        debug!("cleared bundle cache {}", self.bundles_dir.display());
        Ok(())
    }

    pub fn bundles_dir(&self) -> &Path {
        &self.bundles_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.bundles_dir.join(index::INDEX_FILE_NAME)
    }

    /// Fetch a reference, forcing a download when `overwrite` or the
    /// reference's own update flag is set.
    pub fn fetch_reference(
        &self,
        reference: &ArtifactReference,
        overwrite: bool,
        check_attributes: bool,
    ) -> Result<CachedArtifact> {
        let path = self.fetch(
            &reference.url,
            reference.display_name(),
            overwrite || reference.update,
            check_attributes,
        )?;
        Ok(CachedArtifact {
            path,
            reference: reference.clone(),
        })
    }

    /// Return a validated local copy of `url`, downloading when needed.
    pub fn fetch(
        &self,
        url: &Url,
        display_name: &str,
        force_overwrite: bool,
        check_attributes: bool,
    ) -> Result<PathBuf> {
        debug!("fetching [{url}]");
        let key = url.as_str();
        let index_path = self.index_path();
        let mut index = CacheIndex::load_or_empty(&index_path);

        let hash_stem = hash_stem(key);
        let file_name = match index.get(key) {
            Some(name) if manifest::is_plain_file_name(name) => name.to_owned(),
            Some(name) => {
                debug!("ignoring index entry '{name}' for [{url}]");
                format!("{hash_stem}.jar")
            }
            None => format!("{hash_stem}.jar"),
        };
        let destination = self.bundles_dir.join(&file_name);

        let mut download = force_overwrite || !destination.is_file();
        if !download {
            match manifest::validate_bundle(&destination, &hash_stem, check_attributes) {
                Validation::Valid { canonical_name } if canonical_name == file_name => {
                    debug!("reusing cached {}", destination.display());
                }
                Validation::Valid { canonical_name } => {
                    debug!(
                        "cached {} should be named {canonical_name}; downloading again",
                        destination.display()
                    );
                    download = true;
                }
                Validation::Invalid { reason } => {
                    debug!("cached {} {reason}; downloading again", destination.display());
                    download = true;
                }
            }
        }

        if download {
            self.download(url, display_name, &destination)?;
        }

        let canonical_name =
            match manifest::validate_bundle(&destination, &hash_stem, check_attributes) {
                Validation::Valid { canonical_name } => canonical_name,
                Validation::Invalid { reason } => return Err(Error::artifact(key, reason)),
            };

        let target = self.bundles_dir.join(&canonical_name);
        if canonical_name != file_name {
            if target.exists() {
                fs::remove_file(&target).map_err(|e| {
                    Error::artifact_caused(key, format!("cannot delete {}", target.display()), e)
                })?;
            }
            fs::rename(&destination, &target).map_err(|e| {
                Error::artifact_caused(
                    key,
                    format!(
                        "cannot rename {} to {}",
                        destination.display(),
                        target.display()
                    ),
                    e,
                )
            })?;
            index.insert(key, &canonical_name);
            index
                .save(&index_path)
                .map_err(|e| Error::artifact_caused(key, "cannot store cache index", e))?;
        }

        Ok(target)
    }

    fn download(&self, url: &Url, display_name: &str, destination: &Path) -> Result<()> {
        let key = url.as_str();
        info!("downloading {display_name}");
        let partial = destination.with_extension("jar.part");

        let result = (|| -> anyhow::Result<u64> {
            let Download { mut reader, length } = self.transport.open(url)?;
            let file = File::create(&partial)?;
            let mut writer = BufWriter::new(file);
            let mut progress =
                progress::Progress::console(self.progress, display_name, length, self.console);
            let copied = progress.copy(&mut reader, &mut writer)?;
            drop(writer);
            fs::rename(&partial, destination)?;
            Ok(copied)
        })();

        match result {
            Ok(bytes) => {
                debug!("downloaded {bytes} bytes to [{}]", destination.display());
                Ok(())
            }
            Err(err) => {
                let _ = fs::remove_file(&partial);
                Err(Error::artifact_caused(
                    key,
                    "could not be downloaded",
                    err,
                ))
            }
        }
    }
}

/// Stable file stem for a URL before its manifest is known.
pub fn hash_stem(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}
