mod args;
mod checksum;
mod colors;
mod config;
mod desktop;
mod discovery;
mod extract;
mod installer;
mod integrate;
mod report;
mod resolve;
mod store;
mod vars;
mod version;

use crate::args::Args;
use crate::colors::*;
use crate::config::*;
use crate::installer::{Installer, Outcome};
use crate::integrate::NoopRefresher;
use crate::version::Version;
use clap::Parser;
use std::path::{self, Path, PathBuf};
use std::time::{Duration, Instant};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{level_filters::*, *};
use tracing_subscriber::EnvFilter;

// Exit code used in case there were no errors.
#[doc(hidden)]
const EXIT_OK: i32 = 0;

// Exit code used in case of errors.
#[doc(hidden)]
const EXIT_NOK: i32 = 1;

/// Main entry point for the application.
fn main() {
    // delegate
    if let Err(err) = internal_main() {
        let err_str = ATTENTION_COLOR.paint(format!("{err:#}"));
        eprintln!("Failed! {err_str}");
        std::process::exit(EXIT_NOK);
    } else {
        std::process::exit(EXIT_OK);
    }
}

// Internal main entry point for the application.
#[doc(hidden)]
fn internal_main() -> anyhow::Result<()> {
    // remember start date/time
    let start = Instant::now();

    // parse arguments
    let args = Args::parse();

    // print some information
    if !args.quiet || args.version {
        print_info();
    }

    // stop here in case only the version was requested
    if args.version {
        return Ok(());
    }

    // init tracing
    init_tracing(&args);

    // print parsed arguments
    trace!("arguments: {args:#?}");

    // determine working directory
    let workdir = match &args.directory {
        Some(directory) => PathBuf::from(directory),
        None => std::env::current_dir()?,
    };
    let workdir = path::absolute(&workdir).unwrap_or(workdir);
    debug!(workdir = %workdir.display());

    // load config
    let (config, config_path) = Config::load(args.config.as_deref().map(Path::new), &workdir)?;
    if let Some(config_path) = config_path {
        let config_path = path::absolute(&config_path).unwrap_or(config_path);
        println!("Using configuration from {}.", PATH_COLOR.paint(config_path.to_string_lossy()));
    }
    debug!(?config);

    // set up installer
    let mut installer = Installer::new(config);
    installer.dry_run(args.dry_run);
    if args.no_refresh {
        installer.refresher(Box::new(NoopRefresher));
    }

    // install
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    match installer.install(&workdir, now)? {
        Outcome::Installed(installed) => report::print_report(&installed, args.quiet),
        Outcome::Planned(plan) => report::print_plan(&plan),
    }

    // print some statistics
    if !args.quiet {
        let elapsed = start.elapsed();
        println!("Total time: {}", format_elapsed(elapsed));
        println!("Finished at: {}", format_now(OffsetDateTime::now_utc()));
    }

    Ok(())
}

// Formats the elapsed time with a precision of seconds.
#[doc(hidden)]
fn format_elapsed(elapsed: Duration) -> String {
    // null out everything below seconds
    let elapsed = Duration::from_secs(elapsed.as_secs());

    // format the remaining duration
    humantime::format_duration(elapsed).to_string()
}

// Formats the given point in time in the local offset (or UTC).
#[doc(hidden)]
fn format_now(now: OffsetDateTime) -> String {
    // define format
    const FORMAT: &[FormatItem<'_>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]");

    // local offset or UTC
    let offset = UtcOffset::current_local_offset();
    let offset = offset.unwrap_or(UtcOffset::UTC);
    trace!(?offset);

    // format
    let now = now.to_offset(offset);
    now.format(&FORMAT).unwrap_or(now.to_string())
}

// Prints some information (version, path of executable, etc.).
#[doc(hidden)]
fn print_info() {
    let version = Version::default();
    if let Ok(exe) = std::env::current_exe() {
        let exe = PATH_COLOR.paint(exe.to_string_lossy());
        println!("{version} [{exe}]");
    } else {
        println!("{version}");
    }
}

// Initialises the tracing framework based on given command line arguments.
#[doc(hidden)]
fn init_tracing(args: &Args) {
    let level_filter = match args.verbose {
        0 => LevelFilter::ERROR.into(),
        1 => LevelFilter::WARN.into(),
        2 => LevelFilter::INFO.into(),
        3 => LevelFilter::DEBUG.into(),
        _ => LevelFilter::TRACE.into(),
    };
    let env_filter = EnvFilter::from_default_env().add_directive(level_filter);
    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();
}
