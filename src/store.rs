//! Directory-backed record store.
//!
//! Each record is one pretty-printed JSON file under a per-namespace
//! subdirectory of the base data directory. Writes go through a sibling
//! temp file and a rename so readers on the same host never observe a
//! partially written record.

use std::fs;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::RegistryResult;

/// Directory permissions for the base and namespace directories
const DIR_MODE: u32 = 0o755;

/// File permissions for record files
const FILE_MODE: u32 = 0o644;

/// Record namespace, one subdirectory per variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Node inventory records
    Nodes,

    /// Account placement records
    Placements,
}

impl Namespace {
    fn as_str(&self) -> &'static str {
        match self {
            Namespace::Nodes => "nodes",
            Namespace::Placements => "placements",
        }
    }
}

/// Filesystem store mapping record keys to JSON files
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `base_dir`, creating the base and namespace
    /// directories if they do not exist yet.
    pub fn open<P: AsRef<Path>>(base_dir: P) -> RegistryResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();

        fs::create_dir_all(&base_dir)?;
        set_mode(&base_dir, DIR_MODE)?;
        for ns in [Namespace::Nodes, Namespace::Placements] {
            let dir = base_dir.join(ns.as_str());
            fs::create_dir_all(&dir)?;
            set_mode(&dir, DIR_MODE)?;
        }

        Ok(Self { base_dir })
    }

    fn record_path(&self, namespace: Namespace, key: &str) -> PathBuf {
        self.base_dir
            .join(namespace.as_str())
            .join(format!("{}.json", key))
    }

    /// Read and parse one record.
    ///
    /// Returns `Ok(None)` when no file exists for the key, so callers can
    /// distinguish absence from IO and parse failures.
    pub fn read<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> RegistryResult<Option<T>> {
        let path = self.record_path(namespace, key);
        let buf = match fs::read(&path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&buf)?))
    }

    /// Serialize and durably write one record, replacing any previous
    /// contents. The record is written to a temp file in the same
    /// directory, synced, renamed into place, and the directory is synced
    /// so the rename itself survives a crash.
    pub fn write<T: Serialize>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &T,
    ) -> RegistryResult<()> {
        let dir = self.base_dir.join(namespace.as_str());
        let path = dir.join(format!("{}.json", key));
        let tmp_path = dir.join(format!(".{}.json.tmp", key));

        let buf = serde_json::to_vec_pretty(value)?;

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        set_mode(&tmp_path, FILE_MODE)?;
        fs::rename(&tmp_path, &path)?;
        sync_dir(&dir)?;

        debug!("wrote {}/{}.json", namespace.as_str(), key);
        Ok(())
    }

    /// Remove one record file. A missing file surfaces as an IO error the
    /// caller may choose to ignore.
    pub fn delete(&self, namespace: Namespace, key: &str) -> RegistryResult<()> {
        fs::remove_file(self.record_path(namespace, key))?;
        debug!("deleted {}/{}.json", namespace.as_str(), key);
        Ok(())
    }

    /// List the keys for which a `.json` record file exists. Directories
    /// and other entries are skipped; a missing namespace directory yields
    /// the empty list.
    pub fn keys(&self, namespace: Namespace) -> RegistryResult<Vec<String>> {
        let dir = self.base_dir.join(namespace.as_str());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }

        Ok(keys)
    }

    /// Read and parse every record in a namespace. A record that cannot
    /// be read or parsed is logged and skipped so one corrupt file does
    /// not hide the rest.
    pub fn load_all<T: DeserializeOwned>(&self, namespace: Namespace) -> RegistryResult<Vec<T>> {
        let mut records = Vec::new();
        for key in self.keys(namespace)? {
            match self.read(namespace, &key) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {} // removed between listing and read
                Err(e) => {
                    warn!("skipping unreadable record {}/{}: {}", namespace.as_str(), key, e);
                }
            }
        }

        Ok(records)
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

// Directories cannot be opened for syncing on non-unix platforms
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
