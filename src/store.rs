//! Version store.
//!
//! This module contains the append-only directory holding every installed AppImage under a timestamped name, and the
//! `current` alias pointing at the active one.

use crate::checksum;
use std::fs::{self, File, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;
use tracing::{debug, instrument, trace, warn};

/// Name of the alias pointing at the active version.
pub(crate) const CURRENT_ALIAS: &str = "current";

/// Name of the temporary alias renamed over [`CURRENT_ALIAS`].
const CURRENT_ALIAS_TMP: &str = ".current.tmp";

/// Name of the lock file guarding the store.
const LOCK_FILE: &str = ".lock";

/// Format of the timestamp within version names.
const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!("[year][month][day]_[hour][minute][second]");

/// The error type for operations on the version store.
#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    /// Another installer holds the lock.
    #[error("{} is locked by another installer", .dir.display())]
    Locked { dir: PathBuf },
    /// Formatting the timestamp failed.
    #[error("failed to format timestamp")]
    Timestamp(#[from] time::error::Format),
    /// A copied version does not match its source.
    #[error("copy of {} is corrupt (expected {expected}, got {actual})", .path.display())]
    Corrupt { path: PathBuf, expected: String, actual: String },
    /// Any other I/O error.
    #[error("{action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// Shorthand to wrap an I/O error with some context.
#[doc(hidden)]
fn io_err(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { action, path, source }
}

/// A version stored in the version store.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredVersion {
    /// The file name within the store.
    pub(crate) file_name: String,
    /// The full path of the file.
    pub(crate) path: PathBuf,
}

/// The version store rooted at a directory.
#[derive(Debug)]
pub(crate) struct VersionStore {
    dir: PathBuf,
    suffix: String,
    // whether opening created the directory
    created: bool,
    // held for the lifetime of the store
    _lock: File,
}

impl VersionStore {
    /// Opens (creating it if necessary) and locks the version store at the given directory.
    #[instrument(err, level = "trace")]
    pub(crate) fn open(dir: &Path, suffix: &str) -> Result<Self, StoreError> {
        let created = !dir.exists();
        fs::create_dir_all(dir).map_err(io_err("failed to create", dir))?;

        let lock_path = dir.join(LOCK_FILE);
        let lock = File::options() //
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_err("failed to open", &lock_path))?;
        match lock.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(StoreError::Locked { dir: dir.to_path_buf() }),
            Err(TryLockError::Error(err)) => return Err(io_err("failed to lock", &lock_path)(err)),
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            suffix: suffix.to_string(),
            created,
            _lock: lock,
        })
    }

    /// Releases the store without having stored anything. A directory created by [`VersionStore::open`] is removed
    /// again (together with the lock file).
    pub(crate) fn discard(self) {
        if !self.created {
            return;
        }

        let lock_path = self.dir.join(LOCK_FILE);
        if let Err(err) = fs::remove_file(&lock_path) {
            warn!(?err, path = %lock_path.display(), "failed to remove lock file");
        }
        if let Err(err) = fs::remove_dir(&self.dir) {
            warn!(?err, dir = %self.dir.display(), "failed to remove version directory");
        }
    }

    /// The directory of the store.
    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the version name for the given base name and point in time (see [`version_name`]).
    pub(crate) fn version_name(&self, basename: &str, now: OffsetDateTime) -> Result<String, StoreError> {
        version_name(&self.dir, basename, &self.suffix, now)
    }

    /// Moves the given file into the store under a timestamped name.
    #[instrument(err, level = "trace", skip(self))]
    pub(crate) fn store(&self, input: &Path, basename: &str, now: OffsetDateTime) -> Result<StoredVersion, StoreError> {
        let file_name = self.version_name(basename, now)?;
        let path = self.dir.join(&file_name);
        move_file(input, &path)?;
        debug!(from = %input.display(), to = %path.display(), "stored version");

        Ok(StoredVersion { file_name, path })
    }

    /// Moves a stored version back to where it came from.
    #[instrument(err, level = "trace", skip(self))]
    pub(crate) fn unstore(&self, version: &StoredVersion, original: &Path) -> Result<(), StoreError> {
        move_file(&version.path, original)
    }

    /// Returns the target of the `current` alias, if there is one.
    pub(crate) fn current(&self) -> Option<PathBuf> {
        fs::read_link(self.dir.join(CURRENT_ALIAS)).ok()
    }

    /// Points the `current` alias at the given version and returns its previous target. The alias is a relative
    /// symlink created under a temporary name and renamed over the old one, so it never goes missing.
    #[instrument(err, level = "trace", skip(self))]
    pub(crate) fn set_current(&self, file_name: &str) -> Result<Option<PathBuf>, StoreError> {
        let previous = self.current();
        self.link_current(Path::new(file_name))?;

        Ok(previous)
    }

    /// Restores the `current` alias to the given previous target, or removes it if there was none.
    #[instrument(err, level = "trace", skip(self))]
    pub(crate) fn restore_current(&self, previous: Option<&Path>) -> Result<(), StoreError> {
        match previous {
            Some(target) => self.link_current(target),
            None => {
                let alias = self.dir.join(CURRENT_ALIAS);
                match fs::remove_file(&alias) {
                    Err(err) if err.kind() != io::ErrorKind::NotFound => Err(io_err("failed to remove", &alias)(err)),
                    _ => Ok(()),
                }
            }
        }
    }

    // Atomically (re)places the alias.
    #[doc(hidden)]
    fn link_current(&self, target: &Path) -> Result<(), StoreError> {
        let alias = self.dir.join(CURRENT_ALIAS);
        let tmp = self.dir.join(CURRENT_ALIAS_TMP);

        // remove left-overs from an interrupted run
        if fs::symlink_metadata(&tmp).is_ok() {
            fs::remove_file(&tmp).map_err(io_err("failed to remove", &tmp))?;
        }

        symlink(target, &tmp).map_err(io_err("failed to create symlink", &tmp))?;
        if let Err(err) = fs::rename(&tmp, &alias) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err("failed to replace", &alias)(err));
        }
        trace!(alias = %alias.display(), target = %target.display(), "linked alias");

        Ok(())
    }

    /// Lists the file names of all stored versions in lexicographic (and thereby chronological) order.
    pub(crate) fn versions(&self) -> Result<Vec<String>, StoreError> {
        let mut versions = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err("failed to read", &self.dir))? {
            let entry = entry.map_err(io_err("failed to read", &self.dir))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || name == CURRENT_ALIAS || !name.ends_with(&self.suffix) {
                continue;
            }
            versions.push(name);
        }
        versions.sort();

        Ok(versions)
    }
}

/// Returns the name of a version within the given directory for the given base name and point in time, disambiguated
/// with `_1`, `_2`, ... if a version of that name already exists.
pub(crate) fn version_name(dir: &Path, basename: &str, suffix: &str, now: OffsetDateTime) -> Result<String, StoreError> {
    let timestamp = now.format(TIMESTAMP_FORMAT)?;
    let mut name = format!("{basename}_{timestamp}{suffix}");
    let mut n = 0;
    // symlink_metadata so that dangling links count as taken, too
    while fs::symlink_metadata(dir.join(&name)).is_ok() {
        n += 1;
        name = format!("{basename}_{timestamp}_{n}{suffix}");
    }

    Ok(name)
}

// Moves a file, falling back to copy and delete when renaming is not possible (e.g. across file systems).
#[doc(hidden)]
fn move_file(from: &Path, to: &Path) -> Result<(), StoreError> {
    let Err(err) = fs::rename(from, to) else {
        return Ok(());
    };
    if err.kind() != io::ErrorKind::CrossesDevices {
        return Err(io_err("failed to move", from)(err));
    }

    debug!(from = %from.display(), to = %to.display(), "rename not possible, copying");
    copy_verified(from, to)?;
    if let Err(err) = fs::remove_file(from) {
        warn!(?err, from = %from.display(), "failed to remove source after copying");
    }

    Ok(())
}

// Copies a file (including its permissions) and verifies the copy by reading it back. The copy is removed again if
// anything goes wrong.
#[doc(hidden)]
fn copy_verified(from: &Path, to: &Path) -> Result<(), StoreError> {
    let result = (|| -> Result<(), StoreError> {
        let expected = checksum::copy_with_checksum(from, to).map_err(io_err("failed to copy", to))?;
        let actual = checksum::checksum(to).map_err(io_err("failed to read", to))?;
        if expected != actual {
            return Err(StoreError::Corrupt {
                path: to.to_path_buf(),
                expected,
                actual,
            });
        }
        let permissions = fs::metadata(from).map_err(io_err("failed to read", from))?.permissions();
        fs::set_permissions(to, permissions).map_err(io_err("failed to set permissions of", to))
    })();

    if result.is_err() {
        let _ = fs::remove_file(to);
    }

    result
}

#[cfg(unix)]
#[doc(hidden)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
#[doc(hidden)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {

    use super::*;
    use tempfile::tempdir;
    use test_log::test;
    use time::macros::datetime;

    const SUFFIX: &str = ".AppImage";

    #[test]
    fn version_name_format() {
        let tempdir = tempdir().unwrap();
        let store = VersionStore::open(tempdir.path(), SUFFIX).unwrap();
        let name = store.version_name("Cursor-1.0", datetime!(2024-03-05 07:08:09 UTC)).unwrap();
        assert_eq!(name, "Cursor-1.0_20240305_070809.AppImage");
    }

    #[test]
    fn same_second_is_disambiguated() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path();
        let store = VersionStore::open(&dir.join("versions"), SUFFIX).unwrap();
        let now = datetime!(2024-03-05 07:08:09 UTC);

        fs::write(dir.join("a.AppImage"), "first").unwrap();
        let first = store.store(&dir.join("a.AppImage"), "a", now).unwrap();
        fs::write(dir.join("a.AppImage"), "second").unwrap();
        let second = store.store(&dir.join("a.AppImage"), "a", now).unwrap();

        assert_eq!(first.file_name, "a_20240305_070809.AppImage");
        assert_eq!(second.file_name, "a_20240305_070809_1.AppImage");
        assert_eq!(fs::read_to_string(&first.path).unwrap(), "first");
        assert_eq!(fs::read_to_string(&second.path).unwrap(), "second");
    }

    #[test]
    fn store_moves_input() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path();
        let input = dir.join("a.AppImage");
        fs::write(&input, "data").unwrap();
        let store = VersionStore::open(&dir.join("versions"), SUFFIX).unwrap();

        let version = store.store(&input, "a", datetime!(2024-01-01 00:00:00 UTC)).unwrap();
        assert!(!input.exists());
        assert_eq!(version.path, dir.join("versions").join(&version.file_name));
        assert_eq!(fs::read_to_string(&version.path).unwrap(), "data");

        store.unstore(&version, &input).unwrap();
        assert!(input.exists());
        assert!(!version.path.exists());
    }

    #[test]
    fn copy_keeps_content_and_permissions() {
        let tempdir = tempdir().unwrap();
        let from = tempdir.path().join("a.AppImage");
        let to = tempdir.path().join("b.AppImage");
        fs::write(&from, "data").unwrap();

        copy_verified(&from, &to).unwrap();
        assert_eq!(fs::read_to_string(&to).unwrap(), "data");
        assert_eq!(fs::metadata(&to).unwrap().permissions(), fs::metadata(&from).unwrap().permissions());
    }

    #[cfg(unix)]
    #[test]
    fn copy_detects_lost_data() {
        let tempdir = tempdir().unwrap();
        let from = tempdir.path().join("a.AppImage");
        let to = tempdir.path().join("b.AppImage");
        fs::write(&from, "abc").unwrap();
        // everything written to the destination vanishes
        std::os::unix::fs::symlink("/dev/null", &to).unwrap();

        assert!(copy_verified(&from, &to).is_err());
        assert_eq!(fs::read_to_string(&from).unwrap(), "abc");
        assert!(fs::symlink_metadata(&to).is_err());
    }

    #[test]
    fn current_alias_is_relative_and_replaced() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path().join("versions");
        let store = VersionStore::open(&dir, SUFFIX).unwrap();
        fs::write(dir.join("a_1.AppImage"), "1").unwrap();
        fs::write(dir.join("a_2.AppImage"), "2").unwrap();

        assert_eq!(store.set_current("a_1.AppImage").unwrap(), None);
        assert_eq!(fs::read_link(dir.join(CURRENT_ALIAS)).unwrap(), PathBuf::from("a_1.AppImage"));

        let previous = store.set_current("a_2.AppImage").unwrap();
        assert_eq!(previous, Some(PathBuf::from("a_1.AppImage")));
        assert_eq!(fs::read_to_string(dir.join(CURRENT_ALIAS)).unwrap(), "2");
        assert!(!dir.join(CURRENT_ALIAS_TMP).exists());

        store.restore_current(previous.as_deref()).unwrap();
        assert_eq!(fs::read_to_string(dir.join(CURRENT_ALIAS)).unwrap(), "1");

        store.restore_current(None).unwrap();
        assert!(fs::symlink_metadata(dir.join(CURRENT_ALIAS)).is_err());
    }

    #[test]
    fn current_alias_replaces_plain_file() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path().join("versions");
        let store = VersionStore::open(&dir, SUFFIX).unwrap();
        fs::write(dir.join(CURRENT_ALIAS), "not a link").unwrap();
        fs::write(dir.join("a_1.AppImage"), "1").unwrap();

        assert_eq!(store.set_current("a_1.AppImage").unwrap(), None);
        assert_eq!(fs::read_to_string(dir.join(CURRENT_ALIAS)).unwrap(), "1");
    }

    #[test]
    fn alias_survives_relocation() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path().join("versions");
        {
            let store = VersionStore::open(&dir, SUFFIX).unwrap();
            fs::write(dir.join("a_1.AppImage"), "1").unwrap();
            store.set_current("a_1.AppImage").unwrap();
        }

        let moved = tempdir.path().join("elsewhere");
        fs::rename(&dir, &moved).unwrap();
        assert_eq!(fs::read_to_string(moved.join(CURRENT_ALIAS)).unwrap(), "1");
    }

    #[test]
    fn versions_are_sorted_and_filtered() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path().join("versions");
        let store = VersionStore::open(&dir, SUFFIX).unwrap();
        fs::write(dir.join("a_20240102_000000.AppImage"), "").unwrap();
        fs::write(dir.join("a_20240101_000000.AppImage"), "").unwrap();
        fs::write(dir.join("notes.txt"), "").unwrap();
        store.set_current("a_20240102_000000.AppImage").unwrap();

        assert_eq!(store.versions().unwrap(), vec!["a_20240101_000000.AppImage", "a_20240102_000000.AppImage"]);
    }

    #[test]
    fn discard_removes_created_directory() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path().join("versions");

        VersionStore::open(&dir, SUFFIX).unwrap().discard();
        assert!(!dir.exists());
    }

    #[test]
    fn discard_keeps_existing_directory() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path().join("versions");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("a_1.AppImage"), "1").unwrap();

        VersionStore::open(&dir, SUFFIX).unwrap().discard();
        assert!(dir.join("a_1.AppImage").exists());
    }

    #[test]
    fn second_store_is_locked_out() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path().join("versions");
        let store = VersionStore::open(&dir, SUFFIX).unwrap();

        let err = VersionStore::open(&dir, SUFFIX).unwrap_err();
        assert!(matches!(err, StoreError::Locked { .. }));

        drop(store);
        assert!(VersionStore::open(&dir, SUFFIX).is_ok());
    }
}
