//! Asset resolution.
//!
//! This module contains the lookups of the descriptor and the icon within an extracted resource tree. Both walk an
//! ordered list of candidate paths (first existing file wins) before falling back to searching the whole tree.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, trace, warn};
use walkdir::WalkDir;

/// Where the descriptor came from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DescriptorSource {
    /// A file found at one of the candidate paths.
    Candidate(PathBuf),
    /// A file found by searching the tree.
    Search(PathBuf),
    /// Nothing was found; a placeholder has to be synthesized.
    Placeholder,
}

impl DescriptorSource {
    /// The path of the found descriptor, if any.
    pub(crate) fn path(&self) -> Option<&Path> {
        match self {
            Self::Candidate(path) | Self::Search(path) => Some(path),
            Self::Placeholder => None,
        }
    }
}

/// The assets found within a resource tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assets {
    pub(crate) descriptor: DescriptorSource,
    pub(crate) icon: Option<PathBuf>,
}

/// Resolves descriptor and icon within the tree at the given root.
#[instrument(level = "trace")]
pub(crate) fn resolve(root: &Path, desktop_candidates: &[String], icon_candidates: &[String], icon_extensions: &[String]) -> Assets {
    let descriptor = if let Some(path) = first_existing(root, desktop_candidates) {
        DescriptorSource::Candidate(path)
    } else if let Some(path) = search(root, |path| has_extension(path, &["desktop"])) {
        DescriptorSource::Search(path)
    } else {
        warn!(root = %root.display(), "no desktop file found");
        DescriptorSource::Placeholder
    };
    debug!(?descriptor);

    let icon = first_existing(root, icon_candidates).or_else(|| search(root, |path| has_extension(path, icon_extensions)));
    if icon.is_none() {
        warn!(root = %root.display(), "no icon found");
    }
    debug!(?icon);

    Assets { descriptor, icon }
}

// Returns the first candidate (relative to root) that exists as a file (following symlinks).
#[doc(hidden)]
fn first_existing(root: &Path, candidates: &[String]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|candidate| root.join(candidate))
        .inspect(|path| trace!(path = %path.display(), "trying candidate"))
        .find(|path| path.is_file())
}

// Returns the first file within the tree matching the given predicate.
#[doc(hidden)]
fn search<P>(root: &Path, predicate: P) -> Option<PathBuf>
where
    P: Fn(&Path) -> bool,
{
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(?err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .find(|path| predicate(path))
}

// Whether the extension of the given path is one of the given extensions (case-insensitive).
#[doc(hidden)]
fn has_extension(path: &Path, extensions: &[impl AsRef<str>]) -> bool {
    let Some(ext) = path.extension().and_then(OsStr::to_str) else {
        return false;
    };

    extensions.iter().any(|e| e.as_ref().eq_ignore_ascii_case(ext))
}
