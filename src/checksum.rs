//! Checksum.
//!
//! This module contains code to create a checksum (SHA256) of stored versions, either from a file or "on the fly"
//! while copying it.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Result as IoResult, Write};
use std::path::Path;

/// Calculates the checksum (SHA256) for the given file.
pub(crate) fn checksum(path: &Path) -> IoResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    let hash = hasher.finalize();
    let checksum = base16ct::lower::encode_string(&hash);

    Ok(checksum)
}

/// Copies the given file, syncs the copy to disk and returns the checksum (SHA256) of the data read from the source.
pub(crate) fn copy_with_checksum(from: &Path, to: &Path) -> IoResult<String> {
    let mut source = File::open(from)?;
    let dest = File::create(to)?;
    let mut checksum_write = ChecksumWrite::new(&dest);
    io::copy(&mut source, &mut checksum_write)?;
    let checksum = checksum_write.checksum()?;
    dest.sync_all()?;

    Ok(checksum)
}

/// The struct to create the checksum (SHA256) "on the fly".
pub(crate) struct ChecksumWrite<W> {
    hasher: Sha256,
    write: W,
}

impl<W: Write> ChecksumWrite<W> {
    /// Creates a new `ChecksumWrite` on top of the given [Write].
    pub(crate) fn new(write: W) -> Self {
        Self { hasher: Sha256::new(), write }
    }

    /// Returns the checksum and consume the `ChecksumWrite`.
    pub(crate) fn checksum(mut self) -> IoResult<String> {
        self.flush()?;
        let hash = self.hasher.finalize();
        let checksum = base16ct::lower::encode_string(&hash);

        Ok(checksum)
    }
}

impl<W: Write> Write for ChecksumWrite<W> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        let n = self.write.write(buf)?;
        self.hasher.update(&buf[..n]);

        Ok(n)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.write.flush()
    }
}
