//! Arguments.
//!
//! This module contains the definition for the available command-line parameters.

use clap::Parser;

/// Integrates the AppImage found in the working directory into the desktop.
#[derive(Debug, Parser)]
#[clap(about)]
pub(crate) struct Args {
    /// Sets a custom config file
    #[clap(short, long, value_name = "file")]
    pub(crate) config: Option<String>,
    /// Sets the working directory to look for the AppImage (defaults to the current directory)
    #[clap(short = 'C', long, value_name = "dir")]
    pub(crate) directory: Option<String>,
    /// Only print what would be done
    #[clap(short = 'n', long, action)]
    pub(crate) dry_run: bool,
    /// Do not refresh the desktop application index
    #[clap(long, action)]
    pub(crate) no_refresh: bool,
    /// Suppress unnecessary information
    #[clap(short = 'q', long, action)]
    pub(crate) quiet: bool,
    /// Change level of verbosity (apply multiple times to increase level)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,
    /// Print version information
    #[clap(short = 'V', long, action)]
    pub(crate) version: bool,
}

#[cfg(test)]
mod tests {

    use super::*;
    use test_log::test;

    #[test]
    fn no_args() {
        let args = Args::try_parse_from(["program"]).unwrap();
        assert_eq!(args.config, None);
        assert_eq!(args.directory, None);
        assert!(!args.dry_run);
        assert!(!args.no_refresh);
    }

    #[test]
    fn config_without_file() {
        let args = Args::try_parse_from(["program", "--config"]);
        assert!(args.is_err());
    }

    #[test]
    fn config_with_file() {
        let args = Args::try_parse_from(["program", "--config", "file"]).unwrap();
        assert_eq!(args.config, Some("file".into()));
    }

    #[test]
    fn directory_short() {
        let args = Args::try_parse_from(["program", "-C", "/tmp/apps"]).unwrap();
        assert_eq!(args.directory, Some("/tmp/apps".into()));
    }

    #[test]
    fn verbosity_counts() {
        let args = Args::try_parse_from(["program", "-vvv", "--no-refresh"]).unwrap();
        assert_eq!(args.verbose, 3);
        assert!(args.no_refresh);
    }
}
