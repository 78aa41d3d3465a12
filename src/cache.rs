//! Working-directory cache for downloaded artifacts and fetched documents.
//!
//! A file present on disk is trusted as a complete fetch of that exact name.
//! Files are only ever written through a temporary file that is renamed into
//! place, so an interrupted download never leaves a truncated artifact.
//!
//! Clones of one cache share their fetch bookkeeping: an artifact needed by
//! several snapshots of one run (typically the orig tarball) is fetched and,
//! under `force`, invalidated only once.

use crate::errors::{DebcompareError, Result};
use crate::network::Fetcher;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::{HashMap, HashSet},
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tempfile::NamedTempFile;

#[derive(Debug, Default)]
struct FetchState {
    /// One lock per artifact name, held while it is checked and fetched
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Names already force-invalidated by this cache
    refreshed: Mutex<HashSet<String>>,
}

impl FetchState {
    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// True the first time `name` is claimed for a forced refresh.
    fn claim_refresh(&self, name: &str) -> bool {
        self.refreshed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string())
    }
}

/// Fails unless `name` is a plain file name that stays in the working dir.
pub fn check_artifact_name(name: &str) -> Result<()> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).is_relative();
    if plain {
        Ok(())
    } else {
        Err(DebcompareError::InvalidArtifactName(name.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    working_dir: PathBuf,
    state: Arc<FetchState>,
}

impl ArtifactCache {
    /// Opens the cache, creating the working directory if needed.
    pub fn new(working_dir: impl Into<PathBuf>) -> Result<Self> {
        let working_dir = working_dir.into();
        fs::create_dir_all(&working_dir).map_err(|e| DebcompareError::io(&working_dir, e))?;
        Ok(ArtifactCache {
            working_dir,
            state: Arc::default(),
        })
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.working_dir.join(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Deletes `name` from the cache if present.
    pub fn invalidate(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        if !path.is_file() {
            return Ok(());
        }
        log::debug!("Removing cached file: {}", path.display());
        match fs::remove_file(&path) {
            // another snapshot sharing the artifact got there first
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            result => result.map_err(|e| DebcompareError::io(&path, e)),
        }
    }

    /// Makes sure every file in `names` is present locally.
    ///
    /// With `force`, all of them are deleted first, unless a clone of this
    /// cache already refreshed them. Missing files are located through
    /// `resolve` and downloaded in order; the first failed download aborts
    /// the remaining ones.
    pub fn ensure<F>(
        &self,
        names: &[String],
        force: bool,
        fetcher: &dyn Fetcher,
        mut resolve: F,
    ) -> Result<Vec<PathBuf>>
    where
        F: FnMut(&str) -> Result<String>,
    {
        for name in names {
            check_artifact_name(name)?;
        }

        if force {
            for name in names {
                let lock = self.state.lock_for(name);
                let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                if self.state.claim_refresh(name) {
                    self.invalidate(name)?;
                }
            }
        }

        let mut paths = Vec::with_capacity(names.len());
        for name in names {
            let lock = self.state.lock_for(name);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let path = self.path(name);
            if path.is_file() {
                log::debug!("Using cached file: {}", path.display());
            } else {
                let url = resolve(name)?;
                self.download(fetcher, &url, name)?;
            }
            paths.push(path);
        }
        Ok(paths)
    }

    /// Downloads `url` into the cache as `name`.
    pub fn download(&self, fetcher: &dyn Fetcher, url: &str, name: &str) -> Result<PathBuf> {
        log::info!("Downloading: {}", url);
        let response = fetcher.get(url).map_err(|e| match e {
            DebcompareError::Http { url, source } => {
                log::error!("unable to download {} from {}", name, url);
                DebcompareError::DownloadFailed {
                    url,
                    reason: source.to_string(),
                }
            }
            other => other,
        })?;
        if !response.is_success() {
            log::error!("unable to download {} from {}", name, url);
            return Err(DebcompareError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP status {}", response.status),
            });
        }
        log::info!("Saving: {}", self.path(name).display());
        self.write(name, &response.body)
    }

    pub fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(name);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| DebcompareError::io(&path, e))
    }

    /// Replaces `name` with `content` in one rename.
    pub fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.path(name);
        let io_err = |e| DebcompareError::io(&path, e);

        let mut tmp = NamedTempFile::new_in(&self.working_dir).map_err(io_err)?;
        tmp.write_all(content).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(path)
    }

    /// Loads a cached JSON document. With `force` the cached copy is removed
    /// and `None` returned so the caller refetches it.
    pub fn load_document<T: DeserializeOwned>(&self, name: &str, force: bool) -> Result<Option<T>> {
        if force {
            self.invalidate(name)?;
            return Ok(None);
        }
        match self.read(name)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn store_document<T: Serialize>(&self, name: &str, document: &T) -> Result<()> {
        let bytes = serde_json::to_vec(document)?;
        self.write(name, &bytes)?;
        Ok(())
    }
}
