//! Version.
//!
//! This module contains the build information printed on startup.

use std::fmt;

/// The build information of the installer.
#[derive(Debug)]
pub(crate) struct Version {
    /// The name of the package.
    pkg_name: &'static str,
    /// The version of the package.
    pkg_version: &'static str,
    /// The value that `git describe` returned at build time.
    git_describe: &'static str,
    /// The version of the rust compiler.
    rustc_semver: &'static str,
}

impl Default for Version {
    fn default() -> Self {
        Self {
            pkg_name: env!("CARGO_PKG_NAME"),
            pkg_version: env!("CARGO_PKG_VERSION"),
            git_describe: env!("VERGEN_GIT_DESCRIBE"),
            rustc_semver: env!("VERGEN_RUSTC_SEMVER"),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            pkg_name,
            pkg_version,
            git_describe,
            rustc_semver,
        } = self;
        write!(f, "{pkg_name} {pkg_version} (git/{git_describe}) (rustc/{rustc_semver})")
    }
}
