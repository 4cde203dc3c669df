//! Installer.
//!
//! This module contains the pipeline turning an AppImage in the working directory into an installed, versioned
//! desktop application: discovery, extraction, asset resolution, version store, desktop integration and cleanup.

use crate::checksum;
use crate::colors::*;
use crate::config::*;
use crate::desktop::DesktopEntry;
use crate::discovery::*;
use crate::extract::*;
use crate::integrate::*;
use crate::report;
use crate::resolve::*;
use crate::store::*;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, error, instrument, trace, warn};

/// The error type for an installer run.
#[derive(Debug, thiserror::Error)]
pub(crate) enum InstallError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Integrate(#[from] IntegrateError),
    #[error(transparent)]
    Config(#[from] anyhow::Error),
}

/// What an installer run did.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The AppImage was installed.
    Installed(Installed),
    /// Nothing was changed (dry-run).
    Planned(Plan),
}

/// The summary of an installation.
#[derive(Debug)]
pub(crate) struct Installed {
    pub(crate) name: String,
    pub(crate) source: PathBuf,
    pub(crate) version: StoredVersion,
    pub(crate) alias: PathBuf,
    pub(crate) descriptor: DescriptorSource,
    pub(crate) integration: Integration,
    pub(crate) checksum: Option<String>,
    pub(crate) refreshed: bool,
    pub(crate) versions: Vec<String>,
}

/// The summary of what an installation would do.
#[derive(Debug)]
pub(crate) struct Plan {
    pub(crate) name: String,
    pub(crate) source: PathBuf,
    pub(crate) version: PathBuf,
    pub(crate) desktop_file: PathBuf,
    pub(crate) icons_dir: PathBuf,
}

// Steps to undo when a later step of the installation fails.
#[derive(Debug)]
enum Undo {
    // move the stored version back to where it came from
    Unstore { version: StoredVersion, original: PathBuf },
    // point the alias back at its previous target (or remove it)
    RestoreAlias { previous: Option<PathBuf> },
}

/// The installer contains everything to integrate an AppImage into the desktop.
#[derive(Debug)]
pub(crate) struct Installer {
    config: Config,
    extractor: Box<dyn Extractor>,
    refresher: Option<Box<dyn DesktopIndexRefresher>>,
    dry_run: bool,
}

impl Installer {
    /// Creates a new [Installer] out of the given [Config].
    pub(crate) fn new(config: Config) -> Self {
        Self {
            config,
            extractor: Box::new(AppImageExtractor),
            refresher: None,
            dry_run: false,
        }
    }

    /// Whether to only plan the installation.
    pub(crate) fn dry_run(&mut self, dry_run: bool) -> &mut Self {
        self.dry_run = dry_run;

        self
    }

    /// Replaces the refresher built from the configured refresh command.
    pub(crate) fn refresher(&mut self, refresher: Box<dyn DesktopIndexRefresher>) -> &mut Self {
        self.refresher = Some(refresher);

        self
    }

    /// Replaces the extractor running the AppImage.
    #[cfg(test)]
    pub(crate) fn extractor(&mut self, extractor: Box<dyn Extractor>) -> &mut Self {
        self.extractor = extractor;

        self
    }

    /// Installs the AppImage found in the given working directory.
    #[instrument(err, level = "trace", skip(self))]
    pub(crate) fn install(&self, workdir: &Path, now: OffsetDateTime) -> Result<Outcome, InstallError> {
        let discovery = discover(workdir, &self.config.suffix)?;
        if !discovery.ignored.is_empty() {
            warn!(ignored = ?discovery.ignored, "multiple AppImages found");
            report::print_ignored(&discovery);
        }

        let basename = discovery.basename(&self.config.suffix);
        let name = self.config.name.clone().unwrap_or_else(|| derive_name(&basename));
        let settings = self.config.resolve(workdir, &name)?;
        trace!(?settings);

        let source = PATH_COLOR.paint(discovery.selected.to_string_lossy());
        let name_str = INFO_COLOR.paint(&name);
        println!("Installing {source} as {name_str}");

        if self.dry_run {
            let version = version_name(&settings.versions_dir, &basename, &settings.suffix, now)?;
            return Ok(Outcome::Planned(Plan {
                name,
                source: discovery.selected,
                version: settings.versions_dir.join(version),
                desktop_file: settings.desktop_file(),
                icons_dir: settings.icons_dir.clone(),
            }));
        }

        let store = VersionStore::open(&settings.versions_dir, &settings.suffix)?;

        // the tree is removed when it goes out of scope, whatever happens below
        let tree = match self.extractor.extract(&discovery.selected, workdir) {
            Ok(tree) => tree,
            Err(err) => {
                store.discard();
                return Err(err.into());
            }
        };
        let assets = resolve(tree.root(), &settings.desktop_candidates, &settings.icon_candidates, &settings.icon_extensions);
        let (entry, descriptor) = load_entry(&assets.descriptor, &name);

        let mut undo = Vec::new();
        let result = commit(&settings, &store, &discovery.selected, &basename, entry, assets.icon.as_deref(), now, &mut undo);
        drop(tree);
        let (version, integration) = match result {
            Ok(committed) => committed,
            Err(err) => {
                rollback(&store, undo);
                return Err(err);
            }
        };

        let refreshed = match self.refresh(&settings) {
            Ok(()) => true,
            Err(err) => {
                debug!(?err, "failed to refresh desktop application index");
                false
            }
        };

        let checksum = checksum::checksum(&version.path)
            .inspect_err(|err| warn!(?err, "failed to compute checksum"))
            .ok();
        let versions = store
            .versions()
            .inspect_err(|err| warn!(?err, "failed to list versions"))
            .unwrap_or_default();

        Ok(Outcome::Installed(Installed {
            name,
            source: discovery.selected,
            alias: store.dir().join(CURRENT_ALIAS),
            version,
            descriptor,
            integration,
            checksum,
            refreshed,
            versions,
        }))
    }

    // Refreshes the desktop application index with the given refresher or the configured command.
    fn refresh(&self, settings: &Settings) -> anyhow::Result<()> {
        if let Some(refresher) = &self.refresher {
            return refresher.refresh();
        }

        #[cfg(feature = "refresh")]
        if let Some(refresher) = CommandRefresher::from_command(&settings.refresh_command) {
            return refresher.refresh();
        }
        #[cfg(not(feature = "refresh"))]
        let _ = settings;

        NoopRefresher.refresh()
    }
}

// Loads the descriptor from the given source, falling back to a placeholder if there is none or it is unusable.
#[doc(hidden)]
fn load_entry(source: &DescriptorSource, name: &str) -> (DesktopEntry, DescriptorSource) {
    let Some(path) = source.path() else {
        return (DesktopEntry::placeholder(name), DescriptorSource::Placeholder);
    };

    let parsed = fs::read_to_string(path).map_err(anyhow::Error::from).and_then(|content| Ok(content.parse::<DesktopEntry>()?));
    match parsed {
        Ok(entry) => {
            debug!(path = %path.display(), name = entry.main().get("Name"), "loaded desktop file");
            (entry, source.clone())
        }
        Err(err) => {
            warn!(?err, path = %path.display(), "unusable desktop file, using a placeholder");
            (DesktopEntry::placeholder(name), DescriptorSource::Placeholder)
        }
    }
}

// Stores the AppImage, points the alias at it and integrates it into the desktop, recording how to undo each step.
#[allow(clippy::too_many_arguments)]
#[doc(hidden)]
fn commit(
    settings: &Settings,
    store: &VersionStore,
    input: &Path,
    basename: &str,
    entry: DesktopEntry,
    icon: Option<&Path>,
    now: OffsetDateTime,
    undo: &mut Vec<Undo>,
) -> Result<(StoredVersion, Integration), InstallError> {
    let version = store.store(input, basename, now)?;
    undo.push(Undo::Unstore {
        version: version.clone(),
        original: input.to_path_buf(),
    });

    let previous = store.set_current(&version.file_name)?;
    undo.push(Undo::RestoreAlias { previous });

    let integration = integrate(settings, entry, &version.path, icon)?;

    Ok((version, integration))
}

// Undoes the given steps in reverse order.
#[doc(hidden)]
fn rollback(store: &VersionStore, undo: Vec<Undo>) {
    for step in undo.into_iter().rev() {
        trace!(?step, "rolling back");
        let result = match &step {
            Undo::Unstore { version, original } => store.unstore(version, original),
            Undo::RestoreAlias { previous } => store.restore_current(previous.as_deref()),
        };
        if let Err(err) = result {
            error!(?err, ?step, "failed to roll back");
            let err_str = ATTENTION_COLOR.paint(format!("err = {err}"));
            eprintln!("Failed to roll back!\r\n\t{err_str}");
        }
    }
}
