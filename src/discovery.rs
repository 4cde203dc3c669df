//! Discovery.
//!
//! This module contains the code to find the AppImage to install within the working directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{instrument, trace};

/// The error type for the discovery of the input file.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DiscoveryError {
    /// No file with the given suffix exists.
    #[error("no '*{suffix}' file found in {} (contents: {})", .dir.display(), format_listing(.listing))]
    NotFound { dir: PathBuf, suffix: String, listing: Vec<String> },
    /// The directory could not be read.
    #[error("failed to read directory {}", .dir.display())]
    Io {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

// Formats the directory listing for the error message.
#[doc(hidden)]
fn format_listing(listing: &[String]) -> String {
    if listing.is_empty() { "<empty>".to_string() } else { listing.join(", ") }
}

/// The result of a successful discovery.
#[derive(Debug)]
pub(crate) struct Discovery {
    /// The selected input file.
    pub(crate) selected: PathBuf,
    /// Other matching files that were ignored.
    pub(crate) ignored: Vec<PathBuf>,
}

impl Discovery {
    /// The base name of the selected file (its file name without the suffix).
    pub(crate) fn basename(&self, suffix: &str) -> String {
        let file_name = self.selected.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        file_name.strip_suffix(suffix).map(str::to_string).unwrap_or(file_name)
    }
}

/// Finds the files ending with the given suffix within the given directory and selects the first in lexicographic
/// order.
#[instrument(err, level = "trace")]
pub(crate) fn discover(dir: &Path, suffix: &str) -> Result<Discovery, DiscoveryError> {
    let io_err = |source| DiscoveryError::Io { dir: dir.to_path_buf(), source };

    let mut listing = Vec::new();
    let mut matches = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();
        // a bare suffix is a hidden file, not an AppImage
        if name.len() > suffix.len() && name.ends_with(suffix) && path.is_file() {
            matches.push(path);
        }
        listing.push(name);
    }
    listing.sort();
    matches.sort();
    trace!(?matches);

    let mut matches = matches.into_iter();
    let Some(selected) = matches.next() else {
        return Err(DiscoveryError::NotFound {
            dir: dir.to_path_buf(),
            suffix: suffix.to_string(),
            listing,
        });
    };

    Ok(Discovery {
        selected,
        ignored: matches.collect(),
    })
}
