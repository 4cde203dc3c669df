//! Global colors used for terminal output.

use nu_ansi_term::Color;

/// The color for failures and things the user must act upon.
pub(crate) const ATTENTION_COLOR: Color = Color::Red;

/// The color for non-fatal warnings (e.g. ambiguous input).
pub(crate) const WARNING_COLOR: Color = Color::Yellow;

/// The color for names and versions.
pub(crate) const INFO_COLOR: Color = Color::Cyan;

/// The color used to colorise paths.
pub(crate) const PATH_COLOR: Color = Color::LightBlue;

/// The color for shell commands in the troubleshooting guide.
pub(crate) const COMMAND_COLOR: Color = Color::Green;
