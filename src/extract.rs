//! Extraction.
//!
//! This module contains the code to unpack the resource tree of an AppImage by means of its own
//! `--appimage-extract` switch.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, instrument, trace, warn};

/// Name of the directory an AppImage extracts itself into (relative to the current directory).
pub(crate) const EXTRACT_DIR: &str = "squashfs-root";

/// The switch telling an AppImage to extract itself.
pub(crate) const EXTRACT_FLAG: &str = "--appimage-extract";

/// The error type for extracting an AppImage.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ExtractError {
    /// The AppImage could not be made executable.
    #[error("failed to make {} executable", .path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Leftovers of a previous extraction could not be removed.
    #[error("failed to remove leftovers at {}", .path.display())]
    Leftovers {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The AppImage could not be started.
    #[error("failed to run {}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The AppImage returned a non-zero exit code.
    #[error("extraction of {} failed ({status})", .path.display())]
    Failed { path: PathBuf, status: ExitStatus },
    /// The AppImage succeeded but left no resource tree behind.
    #[error("extraction of {} produced no {}", .path.display(), .tree.display())]
    MissingTree { path: PathBuf, tree: PathBuf },
}

/// An extracted resource tree. The tree is removed from disk when this value is dropped.
#[derive(Debug)]
pub(crate) struct ExtractedTree {
    root: PathBuf,
}

impl ExtractedTree {
    /// Takes ownership of the tree at the given path.
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory of the tree.
    pub(crate) fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for ExtractedTree {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => trace!(root = %self.root.display(), "removed extracted tree"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(?err, root = %self.root.display(), "failed to remove extracted tree"),
        }
    }
}

/// Trait for things able to unpack the resource tree of an AppImage.
pub(crate) trait Extractor: fmt::Debug {
    /// Extracts the given AppImage within the given working directory.
    fn extract(&self, appimage: &Path, workdir: &Path) -> Result<ExtractedTree, ExtractError>;
}

/// [`Extractor`] running the AppImage itself with `--appimage-extract`.
#[derive(Debug)]
pub(crate) struct AppImageExtractor;

impl Extractor for AppImageExtractor {
    #[instrument(err, level = "trace")]
    fn extract(&self, appimage: &Path, workdir: &Path) -> Result<ExtractedTree, ExtractError> {
        let root = workdir.join(EXTRACT_DIR);

        // remove left-overs from last run, if there are any
        if root.exists() {
            debug!(root = %root.display(), "removing leftovers of a previous extraction");
            fs::remove_dir_all(&root).map_err(|source| ExtractError::Leftovers { path: root.clone(), source })?;
        }

        make_executable(appimage).map_err(|source| ExtractError::Permissions {
            path: appimage.to_path_buf(),
            source,
        })?;

        // from here on, whatever the AppImage writes is cleaned up
        let tree = ExtractedTree::new(&root);

        let status = Command::new(appimage)
            .arg(EXTRACT_FLAG)
            .current_dir(workdir)
            .stdin(Stdio::null()) // disconnect from process
            .stderr(Stdio::null()) // disconnect from process
            .stdout(Stdio::null()) // disconnect from process
            .status()
            .map_err(|source| ExtractError::Spawn {
                path: appimage.to_path_buf(),
                source,
            })?;
        trace!(?status);

        if !status.success() {
            return Err(ExtractError::Failed {
                path: appimage.to_path_buf(),
                status,
            });
        }

        if !root.is_dir() {
            return Err(ExtractError::MissingTree { path: appimage.to_path_buf(), tree: root });
        }

        Ok(tree)
    }
}

// Adds the executable bits to the mode of the given file.
#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)
}

// Nothing to do where there are no executable bits.
#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// [`Extractor`] for tests that creates a fixed tree instead of running anything.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FakeExtractor {
    files: Vec<(String, Vec<u8>)>,
    fail: bool,
}

#[cfg(test)]
impl FakeExtractor {
    /// Adds a file (path relative to the tree root) to the tree.
    pub(crate) fn file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.to_string(), content.into()));
        self
    }

    /// Makes the extraction fail.
    pub(crate) fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }
}

#[cfg(test)]
impl Extractor for FakeExtractor {
    fn extract(&self, appimage: &Path, workdir: &Path) -> Result<ExtractedTree, ExtractError> {
        let root = workdir.join(EXTRACT_DIR);
        let tree = ExtractedTree::new(&root);
        if self.fail {
            return Err(ExtractError::MissingTree { path: appimage.to_path_buf(), tree: root });
        }
        fs::create_dir_all(&root).unwrap();
        for (path, content) in &self.files {
            let path = root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        Ok(tree)
    }
}

#[cfg(all(test, unix))]
mod tests {

    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;
    use test_log::test;

    // Writes a shell script posing as AppImage.
    fn fake_appimage(dir: &Path, script: &str) -> PathBuf {
        let path = dir.join("Fake-1.0.AppImage");
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        path
    }

    #[test]
    fn extract_success() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path();
        let appimage = fake_appimage(dir, r#"[ "$1" = "--appimage-extract" ] || exit 3; mkdir -p squashfs-root/usr && echo hi > squashfs-root/AppRun"#);

        let tree = AppImageExtractor.extract(&appimage, dir).unwrap();
        assert_eq!(tree.root(), dir.join(EXTRACT_DIR));
        assert!(tree.root().join("AppRun").is_file());
        assert!(tree.root().join("usr").is_dir());

        // made executable
        let mode = fs::metadata(&appimage).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        // removed on drop
        drop(tree);
        assert!(!dir.join(EXTRACT_DIR).exists());
    }

    #[test]
    fn extract_failure_cleans_up() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path();
        let appimage = fake_appimage(dir, "mkdir -p squashfs-root/partial; exit 1");

        let err = AppImageExtractor.extract(&appimage, dir).unwrap_err();
        assert!(matches!(err, ExtractError::Failed { .. }));
        assert!(!dir.join(EXTRACT_DIR).exists());
        assert!(appimage.exists());
    }

    #[test]
    fn extract_without_tree() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path();
        let appimage = fake_appimage(dir, "exit 0");

        let err = AppImageExtractor.extract(&appimage, dir).unwrap_err();
        assert!(matches!(err, ExtractError::MissingTree { .. }));
    }

    #[test]
    fn extract_removes_leftovers() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path();
        fs::create_dir_all(dir.join(EXTRACT_DIR).join("stale")).unwrap();
        let appimage = fake_appimage(dir, "[ -e squashfs-root/stale ] && exit 4; mkdir squashfs-root");

        let tree = AppImageExtractor.extract(&appimage, dir).unwrap();
        assert!(!tree.root().join("stale").exists());
    }

    #[test]
    fn extract_not_runnable() {
        let tempdir = tempdir().unwrap();
        let dir = tempdir.path();
        let appimage = dir.join("garbage.AppImage");
        fs::write(&appimage, [0u8, 1, 2, 3]).unwrap();

        let err = AppImageExtractor.extract(&appimage, dir).unwrap_err();
        assert!(matches!(err, ExtractError::Spawn { .. }));
    }
}
