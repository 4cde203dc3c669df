//! Configuration.
//!
//! This module contains the configuration read from an optional YAML file and its resolution into concrete
//! [`Settings`] once the application name is known.

use crate::vars::*;
use anyhow::{Context, anyhow};
use serde::Deserialize;
use std::fs::File;
use std::path::{self, Path, PathBuf};
use tracing::instrument;

/// Name of the default configuration file (looked up in the working directory).
pub(crate) const CONFIG_FILENAME: &str = "appimage-installer.yml";

/// The struct that holds the configuration loaded from a YAML file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct Config {
    /// The application name (descriptor and icon filename); derived from the AppImage if missing.
    #[serde(default)]
    pub(crate) name: Option<String>,
    /// The filename suffix identifying input files.
    #[serde(default = "suffix_default")]
    pub(crate) suffix: String,
    /// The version directory, relative to the working directory.
    #[serde(default = "versions_dir_default")]
    pub(crate) versions_dir: String,
    /// The user-level application registry directory.
    #[serde(default = "applications_dir_default")]
    pub(crate) applications_dir: String,
    /// The user-level icon directory.
    #[serde(default = "icons_dir_default")]
    pub(crate) icons_dir: String,
    /// Flags inserted after the program in every `Exec` key.
    #[serde(default = "exec_flags_default")]
    pub(crate) exec_flags: Vec<String>,
    /// The command refreshing the desktop application index (empty to disable).
    #[serde(default = "refresh_command_default")]
    pub(crate) refresh_command: Vec<String>,
    /// Ordered candidate paths of the descriptor within the extracted tree.
    #[serde(default = "desktop_candidates_default")]
    pub(crate) desktop_candidates: Vec<String>,
    /// Ordered candidate paths of the icon within the extracted tree.
    #[serde(default = "icon_candidates_default")]
    pub(crate) icon_candidates: Vec<String>,
    /// Extensions accepted when searching the extracted tree for any icon.
    #[serde(default = "icon_extensions_default")]
    pub(crate) icon_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: None,
            suffix: suffix_default(),
            versions_dir: versions_dir_default(),
            applications_dir: applications_dir_default(),
            icons_dir: icons_dir_default(),
            exec_flags: exec_flags_default(),
            refresh_command: refresh_command_default(),
            desktop_candidates: desktop_candidates_default(),
            icon_candidates: icon_candidates_default(),
            icon_extensions: icon_extensions_default(),
        }
    }
}

impl Config {
    /// Loads the configuration from the given filename.
    #[instrument(err, level = "trace")]
    pub(crate) fn load_from_file<P>(filename: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path> + std::fmt::Debug,
    {
        let config_file = File::open(filename)?;

        let de = serde_yaml::Deserializer::from_reader(config_file);
        let value = serde_yaml::Value::deserialize(de)?;
        // an empty file deserializes to null
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_value(value)?;

        Ok(config)
    }

    /// Loads the configuration from the explicitly given file, or from the default file within the working
    /// directory if that exists, or falls back to the defaults.
    pub(crate) fn load(explicit: Option<&Path>, workdir: &Path) -> anyhow::Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path).with_context(|| format!("failed to load configuration from {}", path.display()))?;
            return Ok((config, Some(path.to_path_buf())));
        }

        let path = workdir.join(CONFIG_FILENAME);
        if path.is_file() {
            let config = Self::load_from_file(&path).with_context(|| format!("failed to load configuration from {}", path.display()))?;
            return Ok((config, Some(path)));
        }

        Ok((Self::default(), None))
    }

    /// Resolves the configuration for the given working directory and application name.
    #[instrument(err, level = "trace", skip(self))]
    pub(crate) fn resolve(&self, workdir: &Path, name: &str) -> anyhow::Result<Settings> {
        let mut vars = SimpleVarResolver::new();
        vars.insert(VAR_NAME, name);
        vars.insert(VAR_WORKDIR, workdir.to_string_lossy());
        if let Some(data_dir) = dirs::data_dir() {
            vars.insert(VAR_DATA_DIR, data_dir.to_string_lossy());
        }
        if let Some(home) = dirs::home_dir() {
            vars.insert(VAR_HOME, home.to_string_lossy());
        }

        if self.suffix.is_empty() {
            return Err(anyhow!("suffix must not be empty"));
        }

        // the applications directory is a variable for everything else
        let applications_dir = expand_dir(&VarExpander::with_installer_vars(vars.clone()), workdir, &self.applications_dir)?;
        vars.insert(VAR_APPLICATIONS_DIR, applications_dir.to_string_lossy());
        let expander = VarExpander::with_installer_vars(vars);

        Ok(Settings {
            name: name.to_string(),
            suffix: self.suffix.clone(),
            versions_dir: expand_dir(&expander, workdir, &self.versions_dir)?,
            applications_dir,
            icons_dir: expand_dir(&expander, workdir, &self.icons_dir)?,
            exec_flags: expand_all(&expander, &self.exec_flags)?,
            refresh_command: expand_all(&expander, &self.refresh_command)?,
            desktop_candidates: expand_all(&expander, &self.desktop_candidates)?,
            icon_candidates: expand_all(&expander, &self.icon_candidates)?,
            icon_extensions: self.icon_extensions.iter().map(|ext| ext.trim_start_matches('.').to_lowercase()).collect(),
        })
    }
}

/// The fully resolved configuration of one installer run.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) name: String,
    pub(crate) suffix: String,
    pub(crate) versions_dir: PathBuf,
    pub(crate) applications_dir: PathBuf,
    pub(crate) icons_dir: PathBuf,
    pub(crate) exec_flags: Vec<String>,
    pub(crate) refresh_command: Vec<String>,
    pub(crate) desktop_candidates: Vec<String>,
    pub(crate) icon_candidates: Vec<String>,
    pub(crate) icon_extensions: Vec<String>,
}

impl Settings {
    /// The path of the installed descriptor.
    pub(crate) fn desktop_file(&self) -> PathBuf {
        self.applications_dir.join(format!("{}.desktop", self.name))
    }

    /// The path of the installed icon for an icon source with the given extension.
    pub(crate) fn icon_file(&self, ext: &str) -> PathBuf {
        self.icons_dir.join(format!("{}.{ext}", self.name))
    }
}

// Expands the variables within the given string.
#[doc(hidden)]
fn expand(expander: &VarExpander, s: &str) -> anyhow::Result<String> {
    let expanded = expander.expand(s).with_context(|| format!("failed to expand '{s}'"))?;

    Ok(expanded.into_owned())
}

// Expands the variables within all given strings.
#[doc(hidden)]
fn expand_all(expander: &VarExpander, v: &[String]) -> anyhow::Result<Vec<String>> {
    v.iter().map(|s| expand(expander, s)).collect()
}

// Expands the variables within the given directory and makes it absolute (relative to the working directory).
#[doc(hidden)]
fn expand_dir(expander: &VarExpander, workdir: &Path, s: &str) -> anyhow::Result<PathBuf> {
    let dir = workdir.join(expand(expander, s)?);

    Ok(path::absolute(&dir).unwrap_or(dir))
}

/// Derives the application name from the base name of an AppImage (`Cursor-1.2.3-x86_64` becomes `cursor`).
pub(crate) fn derive_name(basename: &str) -> String {
    let name: String = basename.chars().take_while(char::is_ascii_alphanumeric).collect::<String>().to_lowercase();
    if name.is_empty() { "appimage".to_string() } else { name }
}

#[doc(hidden)]
fn suffix_default() -> String {
    ".AppImage".to_string()
}

#[doc(hidden)]
fn versions_dir_default() -> String {
    "versions".to_string()
}

#[doc(hidden)]
fn applications_dir_default() -> String {
    format!("${{{VAR_DATA_DIR}}}/applications")
}

#[doc(hidden)]
fn icons_dir_default() -> String {
    format!("${{{VAR_DATA_DIR}}}/icons")
}

#[doc(hidden)]
fn exec_flags_default() -> Vec<String> {
    vec!["--no-sandbox".to_string()]
}

#[doc(hidden)]
fn refresh_command_default() -> Vec<String> {
    vec!["update-desktop-database".to_string(), format!("${{{VAR_APPLICATIONS_DIR}}}")]
}

#[doc(hidden)]
fn desktop_candidates_default() -> Vec<String> {
    vec![
        format!("${{{VAR_NAME}}}.desktop"), //
        format!("usr/share/applications/${{{VAR_NAME}}}.desktop"),
    ]
}

#[doc(hidden)]
fn icon_candidates_default() -> Vec<String> {
    vec![
        format!("${{{VAR_NAME}}}.png"),
        format!("usr/share/icons/hicolor/512x512/apps/${{{VAR_NAME}}}.png"),
        format!("usr/share/icons/hicolor/256x256/apps/${{{VAR_NAME}}}.png"),
        format!("usr/share/pixmaps/${{{VAR_NAME}}}.png"),
        ".DirIcon".to_string(),
    ]
}

#[doc(hidden)]
fn icon_extensions_default() -> Vec<String> {
    vec!["png".to_string(), "svg".to_string(), "xpm".to_string()]
}
