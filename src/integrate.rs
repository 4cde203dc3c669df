//! Desktop integration.
//!
//! This module contains the code to register a stored version with the desktop: patching and writing the desktop
//! entry, copying the icon and refreshing the desktop application index.

use crate::config::Settings;
use crate::desktop::{DesktopEntry, rewrite_exec};
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, trace};

/// Extension used for icons whose source has none (e.g. `.DirIcon`).
const DEFAULT_ICON_EXTENSION: &str = "png";

/// Mode of the installed desktop entry.
#[cfg(unix)]
const DESKTOP_FILE_MODE: u32 = 0o755;

/// The error type for the desktop integration.
#[derive(Debug, thiserror::Error)]
pub(crate) enum IntegrateError {
    /// Any I/O error.
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
fn io_err(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> IntegrateError {
    let path = path.to_path_buf();
    move |source| IntegrateError::Io { action, path, source }
}

/// What was installed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Integration {
    /// The installed desktop entry.
    pub(crate) desktop_file: PathBuf,
    /// The installed icon, if there was one.
    pub(crate) icon_file: Option<PathBuf>,
}

/// Patches the given entry to launch the given executable and show the given icon (or none).
pub(crate) fn patch_entry(entry: &mut DesktopEntry, executable: &Path, flags: &[String], icon: Option<&Path>) {
    let program = executable.to_string_lossy();

    let main = entry.main_mut();
    let exec = main.get("Exec").unwrap_or_default().to_string();
    main.set("Exec", rewrite_exec(&exec, &program, flags));
    main.replace("TryExec", &*program);
    match icon {
        Some(icon) => main.set("Icon", icon.to_string_lossy()),
        None => {
            main.remove("Icon");
        }
    }

    for action in entry.actions_mut() {
        if let Some(exec) = action.get("Exec").map(str::to_string) {
            action.set("Exec", rewrite_exec(&exec, &program, flags));
        }
        match icon {
            Some(icon) => {
                action.replace("Icon", icon.to_string_lossy());
            }
            None => {
                action.remove("Icon");
            }
        }
        trace!(action = action.name(), "patched action");
    }
}

/// Installs the given entry and icon for the given executable.
#[instrument(err, level = "trace", skip(settings, entry))]
pub(crate) fn integrate(settings: &Settings, mut entry: DesktopEntry, executable: &Path, icon: Option<&Path>) -> Result<Integration, IntegrateError> {
    let icon_file = icon.map(|icon| {
        let ext = icon.extension().and_then(OsStr::to_str).map_or(DEFAULT_ICON_EXTENSION.to_string(), str::to_lowercase);
        settings.icon_file(&ext)
    });
    patch_entry(&mut entry, executable, &settings.exec_flags, icon_file.as_deref());

    // the icon first, so that the entry never points at a missing icon
    if let (Some(source), Some(dest)) = (icon, &icon_file) {
        fs::create_dir_all(&settings.icons_dir).map_err(io_err("failed to create", &settings.icons_dir))?;
        fs::copy(source, dest).map_err(io_err("failed to copy icon to", dest))?;
        debug!(from = %source.display(), to = %dest.display(), "installed icon");
    }

    let desktop_file = settings.desktop_file();
    fs::create_dir_all(&settings.applications_dir).map_err(io_err("failed to create", &settings.applications_dir))?;
    write_replacing(&desktop_file, &entry.to_string())?;
    debug!(path = %desktop_file.display(), "installed desktop entry");

    Ok(Integration { desktop_file, icon_file })
}

// Writes the given content next to the given path and renames it over the path.
#[doc(hidden)]
fn write_replacing(path: &Path, content: &str) -> Result<(), IntegrateError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, content).map_err(io_err("failed to write", &tmp))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(DESKTOP_FILE_MODE)).map_err(io_err("failed to set permissions of", &tmp))?;
    }
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err("failed to replace", path)(err));
    }

    Ok(())
}

/// Trait for refreshing the desktop application index after the registry changed.
pub(crate) trait DesktopIndexRefresher: fmt::Debug {
    /// Refreshes the index.
    fn refresh(&self) -> anyhow::Result<()>;
}

/// [`DesktopIndexRefresher`] that does nothing.
#[derive(Debug)]
pub(crate) struct NoopRefresher;

impl DesktopIndexRefresher for NoopRefresher {
    fn refresh(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// [`DesktopIndexRefresher`] running an external command (usually `update-desktop-database`).
#[cfg(feature = "refresh")]
#[derive(Debug, Clone)]
pub(crate) struct CommandRefresher {
    // The path to the executable.
    program: String,
    // The arguments for the executable.
    args: Vec<String>,
}

#[cfg(feature = "refresh")]
impl CommandRefresher {
    /// Creates a new `CommandRefresher` out of the given command line, or none if it is empty.
    pub(crate) fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;

        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[cfg(feature = "refresh")]
impl DesktopIndexRefresher for CommandRefresher {
    #[instrument(err, level = "trace")]
    fn refresh(&self) -> anyhow::Result<()> {
        use std::process::{Command, Stdio};

        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null()) // disconnect from self
            .stderr(Stdio::null()) // disconnect from self
            .stdout(Stdio::null()) // disconnect from self
            .status()?;
        if !status.success() {
            anyhow::bail!("{} returned {status}", self.program);
        }

        Ok(())
    }
}
