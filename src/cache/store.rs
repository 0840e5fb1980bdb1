//! Crash-safe single-file storage.
//!
//! Every write lands in a uniquely named temp file next to its target and is
//! then renamed into place, so readers observe either the previous file or the
//! new one, never a partial write. Writers serialize on a sibling `.lock` file
//! that is unlinked again when its entry goes away, so the directory only
//! holds lock files for live entries.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tracing::warn;

const LOCK_SUFFIX: &str = ".lock";
const TEMP_PREFIX: &str = ".tmp-";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid entry name `{0}`")]
    InvalidName(String),
    #[error("io error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A directory of independently replaceable files.
#[derive(Debug, Clone)]
pub struct AtomicFileStore {
    root: PathBuf,
}

impl AtomicFileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| StoreError::io(&root, err))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a whole entry. A missing entry is `Ok(None)`.
    pub fn read(&self, name: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.entry_path(name)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io(&path, err)),
        }
    }

    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.entry_path(name)?;
        path.try_exists().map_err(|err| StoreError::io(&path, err))
    }

    /// Counter kept as the contents of `name`; a missing entry reads as zero.
    ///
    /// Needs no lock: the counter is only ever replaced by rename.
    pub fn generation(&self, name: &str) -> Result<u64, StoreError> {
        let Some(raw) = self.read(name)? else {
            return Ok(0);
        };
        let text = String::from_utf8_lossy(&raw);
        match text.trim().parse::<u64>() {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(
                    target = "atelier::cache::store",
                    op = "generation",
                    entry = name,
                    error = %err,
                    "Unreadable generation marker; restarting from zero"
                );
                Ok(0)
            }
        }
    }

    /// Replace an entry atomically under its exclusive lock.
    pub fn write(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        let guard = self.lock(name)?;
        guard.replace(contents)
    }

    /// Remove an entry. Missing entries are treated as success.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.entry_path(name)?;
        remove_if_present(&path).map(|_| ())
    }

    /// Acquire the exclusive lock guarding `name`.
    ///
    /// Blocks until the lock is available. Callers must not hold another
    /// guard while acquiring one.
    pub fn lock(&self, name: &str) -> Result<FileGuard<'_>, StoreError> {
        let path = self.entry_path(name)?;
        let lock_path = self.root.join(format!("{name}{LOCK_SUFFIX}"));
        loop {
            let lock_file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)
                .map_err(|err| StoreError::io(&lock_path, err))?;
            lock_file
                .lock()
                .map_err(|err| StoreError::io(&lock_path, err))?;

            // A previous holder may have unlinked the file while we waited.
            if lock_is_current(&lock_file, &lock_path).map_err(|err| StoreError::io(&lock_path, err))? {
                return Ok(FileGuard {
                    store: self,
                    name: name.to_string(),
                    path,
                    lock_path,
                    lock_file,
                });
            }
        }
    }

    /// Names of all live entries, excluding lock and temp files.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|err| StoreError::io(&self.root, err))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io(&self.root, err))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || name.ends_with(LOCK_SUFFIX) {
                continue;
            }
            let is_file = entry
                .file_type()
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if is_file {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove lock files left without an entry, for example by a process that
    /// died mid-write. Returns how many were removed.
    pub fn prune_orphan_locks(&self) -> Result<usize, StoreError> {
        let mut pruned = 0;
        for name in self.lock_names()? {
            if self.lock(&name)?.release_if_vacant()? {
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    fn lock_names(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|err| StoreError::io(&self.root, err))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io(&self.root, err))?;
            let file_name = entry.file_name();
            let Some(name) = file_name
                .to_str()
                .and_then(|raw| raw.strip_suffix(LOCK_SUFFIX))
            else {
                continue;
            };
            if validate_name(name).is_ok() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

/// Exclusive hold on one entry for a read-modify-write sequence.
///
/// The lock is released when the guard is dropped.
pub struct FileGuard<'a> {
    store: &'a AtomicFileStore,
    name: String,
    path: PathBuf,
    lock_path: PathBuf,
    lock_file: File,
}

impl FileGuard<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read(&self) -> Result<Option<Bytes>, StoreError> {
        self.store.read(&self.name)
    }

    /// Write `contents` to a sibling temp file and rename it over the entry.
    ///
    /// On failure the temp file is removed and the entry keeps its previous
    /// contents.
    pub fn replace(&self, contents: &[u8]) -> Result<(), StoreError> {
        let root = self.store.root();
        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(root)
            .map_err(|err| StoreError::io(root, err))?;

        temp.write_all(contents)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|err| StoreError::io(temp.path(), err))?;

        temp.persist(&self.path)
            .map_err(|err| StoreError::io(&self.path, err.error))?;
        Ok(())
    }

    /// Remove the entry together with its lock file; returns whether an entry
    /// was removed. Consumes the guard since the lock is gone afterwards.
    pub fn remove(self) -> Result<bool, StoreError> {
        let removed = remove_if_present(&self.path)?;
        self.unlink_lock()?;
        Ok(removed)
    }

    /// Drop the lock file when no entry exists; returns whether it was dropped.
    pub fn release_if_vacant(self) -> Result<bool, StoreError> {
        let occupied = self
            .path
            .try_exists()
            .map_err(|err| StoreError::io(&self.path, err))?;
        if occupied {
            return Ok(false);
        }
        self.unlink_lock()
    }

    /// Current value of the counter stored in this entry.
    pub fn generation(&self) -> Result<u64, StoreError> {
        self.store.generation(&self.name)
    }

    /// Advance the counter, returning the new value.
    pub fn bump_generation(&self) -> Result<u64, StoreError> {
        let next = self.generation()?.wrapping_add(1);
        self.replace(next.to_string().as_bytes())?;
        Ok(next)
    }

    #[cfg(unix)]
    fn unlink_lock(&self) -> Result<bool, StoreError> {
        remove_if_present(&self.lock_path)
    }

    // Open files cannot be unlinked everywhere; lock files stay put there.
    #[cfg(not(unix))]
    fn unlink_lock(&self) -> Result<bool, StoreError> {
        Ok(false)
    }
}

impl Drop for FileGuard<'_> {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with(LOCK_SUFFIX)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

#[cfg(unix)]
fn lock_is_current(held: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = held.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(not(unix))]
fn lock_is_current(_held: &File, _path: &Path) -> io::Result<bool> {
    Ok(true)
}

fn remove_if_present(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(StoreError::io(path, err)),
    }
}
