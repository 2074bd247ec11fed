//! Atomic JSON file persistence
//!
//! Every save writes the full document to a sibling temporary file, syncs
//! it, and renames it over the target. A crash at any point leaves either
//! the previous document or the new one on disk, never a mix of both.

use crate::{Result, integrity_error};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// What was found at the store's path
#[derive(Debug)]
pub enum LoadOutcome<T> {
    /// No file at the path
    Missing,
    /// File exists but holds nothing but whitespace
    Empty,
    Loaded(T),
}

/// A single JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// Path of the in-flight temporary file
    pub fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    /// Fresh path an unreadable document is moved to by [`Self::quarantine`]
    ///
    /// Stamped with the current UTC time, plus a counter if that name is
    /// taken, so earlier copies are never overwritten.
    pub fn corrupt_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let base = format!(".corrupt.{stamp}");
        let mut candidate = self.sibling(&base);
        let mut counter = 1u32;
        while candidate.exists() {
            candidate = self.sibling(&format!("{base}.{counter}"));
            counter += 1;
        }
        candidate
    }

    /// Read and decode the document
    ///
    /// Undecodable content is an integrity error; the caller decides whether
    /// to recover from it.
    pub fn load<T: DeserializeOwned>(&self) -> Result<LoadOutcome<T>> {
        if !self.path.exists() {
            return Ok(LoadOutcome::Missing);
        }

        let data = fs::read(&self.path)?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(LoadOutcome::Empty);
        }

        let value = serde_json::from_slice::<T>(&data).map_err(|e| {
            integrity_error!("{} is not a valid document: {}", self.path.display(), e)
        })?;
        Ok(LoadOutcome::Loaded(value))
    }

    /// Replace the document atomically
    ///
    /// Returns `Ok` once the rename has happened: from that point the new
    /// document is what a restart reads, so later failures are only logged.
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        self.save_with(value, sync_dir)
    }

    fn save_with<T: Serialize>(
        &self,
        value: &T,
        sync_parent: impl FnOnce(&Path) -> Result<()>,
    ) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(value)?;
        let tmp_path = self.temp_path();

        let written = (|| -> Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)?;
            Ok(())
        })();

        if written.is_err() && tmp_path.is_file() {
            let _ = fs::remove_file(&tmp_path);
        }
        written?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = sync_parent(parent) {
                warn!(
                    "{} replaced but directory sync failed: {}",
                    self.path.display(),
                    e
                );
            }
        }

        Ok(())
    }

    /// Move an unreadable document aside so it is kept for inspection
    pub fn quarantine(&self) -> Result<PathBuf> {
        let target = self.corrupt_path();
        fs::rename(&self.path, &target)?;
        Ok(target)
    }
}

/// Make a completed rename durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
