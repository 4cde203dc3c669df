//! Report.
//!
//! This module contains the terminal output of an installer run: the summary of what was installed (or would be) and
//! the troubleshooting guide for AppImages that refuse to start.

use crate::colors::*;
use crate::discovery::Discovery;
use crate::installer::{Installed, Plan};
use crate::resolve::DescriptorSource;
use std::path::Path;

/// Prints the AppImages ignored in favor of the selected one.
pub(crate) fn print_ignored(discovery: &Discovery) {
    let selected = PATH_COLOR.paint(discovery.selected.to_string_lossy());
    let warning = WARNING_COLOR.paint(format!("Found {} AppImages", discovery.ignored.len() + 1));
    println!("{warning}, using {selected} and ignoring:");
    for ignored in &discovery.ignored {
        println!("\t{}", PATH_COLOR.paint(ignored.to_string_lossy()));
    }
}

/// Prints what an installation would do.
pub(crate) fn print_plan(plan: &Plan) {
    let not = ATTENTION_COLOR.paint("NOT");
    let name = INFO_COLOR.paint(&plan.name);
    println!("dry-run: {not} installing {} as {name}", path(&plan.source));
    println!("\tversion:      {}", path(&plan.version));
    println!("\tdesktop file: {}", path(&plan.desktop_file));
    println!("\ticons:        {}", path(&plan.icons_dir));
}

/// Prints the summary of an installation, followed by the troubleshooting guide unless `quiet` is set.
pub(crate) fn print_report(installed: &Installed, quiet: bool) {
    let name = INFO_COLOR.paint(&installed.name);
    println!("Installed {name} from {}", path(&installed.source));
    println!("\tversion:      {}", path(&installed.version.path));
    println!("\talias:        {}", path(&installed.alias));
    println!("\tdesktop file: {} ({})", path(&installed.integration.desktop_file), descriptor(&installed.descriptor));
    match &installed.integration.icon_file {
        Some(icon) => println!("\ticon:         {}", path(icon)),
        None => println!("\ticon:         {}", WARNING_COLOR.paint("none")),
    }
    if let Some(checksum) = &installed.checksum {
        println!("\tsha256:       {checksum}");
    }
    if !installed.refreshed {
        let not = WARNING_COLOR.paint("not");
        println!("\tdesktop application index {not} refreshed");
    }

    if installed.versions.len() > 1 {
        println!("Installed versions:");
        for line in format_versions(&installed.versions, &installed.version.file_name) {
            println!("\t{line}");
        }
    }

    if !quiet {
        print_troubleshooting();
    }
}

// Formats the given version names, marking the current one.
#[doc(hidden)]
fn format_versions(versions: &[String], current: &str) -> Vec<String> {
    versions
        .iter()
        .map(|version| {
            if version == current {
                format!("{version} (current)")
            } else {
                version.clone()
            }
        })
        .collect()
}

// Describes where the desktop entry came from.
#[doc(hidden)]
fn descriptor(source: &DescriptorSource) -> &'static str {
    match source {
        DescriptorSource::Candidate(_) => "from AppImage",
        DescriptorSource::Search(_) => "found in AppImage",
        DescriptorSource::Placeholder => "generated",
    }
}

#[doc(hidden)]
fn path(path: &Path) -> String {
    PATH_COLOR.paint(path.to_string_lossy()).to_string()
}

// Prints hints for the usual reasons an AppImage does not start.
#[doc(hidden)]
fn print_troubleshooting() {
    let cmd = |s: &str| COMMAND_COLOR.paint(s.to_string()).to_string();

    println!();
    println!("If the application does not start:");
    println!("\t- Electron based applications may need {} (see the exec flags in the configuration).", cmd("--no-sandbox"));
    println!("\t- Run {} from a terminal to see its output.", cmd("versions/current"));
    println!("\t- If user namespaces are restricted by AppArmor (Ubuntu 23.10 and later), allow them with");
    println!("\t\t{}", cmd("sudo sysctl -w kernel.apparmor_restrict_unprivileged_userns=0"));
    println!("\t  and make it permanent with");
    println!(
        "\t\t{}",
        cmd("echo 'kernel.apparmor_restrict_unprivileged_userns=0' | sudo tee /etc/sysctl.d/60-apparmor-namespace.conf")
    );
    println!("\t- AppImages need FUSE 2, e.g. {}.", cmd("sudo apt install libfuse2"));
    println!("\t- If the entry does not show up in the menu, run {}.", cmd("update-desktop-database ~/.local/share/applications"));
}
