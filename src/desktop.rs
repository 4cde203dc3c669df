//! Desktop entry.
//!
//! This module contains a small model of the desktop entry format (groups of `key=value` lines). Parsing keeps
//! comments, blank lines and the order of keys so that a patched entry differs from its source only in the keys
//! that were changed.
//!
//! See <https://specifications.freedesktop.org/desktop-entry-spec/latest/>.

use std::fmt;
use std::str::FromStr;

/// The name of the main group.
pub(crate) const MAIN_GROUP: &str = "Desktop Entry";

/// The prefix of action groups.
pub(crate) const ACTION_GROUP_PREFIX: &str = "Desktop Action ";

/// The error type for parsing desktop entries.
#[derive(Debug, PartialEq, thiserror::Error)]
pub(crate) enum DesktopError {
    /// There is no `[Desktop Entry]` group.
    #[error("missing [Desktop Entry] group")]
    MissingMainGroup,
    /// A key/value line appears before the first group header.
    #[error("line {0}: entry outside of a group")]
    EntryOutsideGroup(usize),
    /// A group header is not terminated.
    #[error("line {0}: malformed group header")]
    MalformedHeader(usize),
}

/// A line within a group.
#[derive(Debug, Clone, PartialEq)]
enum Line {
    /// A `key=value` entry.
    Entry { key: String, value: String },
    /// A comment, blank line or anything else kept verbatim.
    Verbatim(String),
}

/// A group (`[name]` followed by its lines).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Group {
    name: String,
    lines: Vec<Line>,
}

impl Group {
    /// Creates a new, empty group.
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), lines: Vec::new() }
    }

    /// The name of the group (without brackets).
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is an action group (`[Desktop Action ...]`).
    pub(crate) fn is_action(&self) -> bool {
        self.name.starts_with(ACTION_GROUP_PREFIX)
    }

    /// Returns the value of the given key.
    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Sets the value of the given key, replacing the first occurrence in place or appending after the last entry.
    pub(crate) fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        for line in &mut self.lines {
            if let Line::Entry { key: k, value: v } = line {
                if *k == key {
                    *v = value;
                    return;
                }
            }
        }

        // keep trailing blank lines/comments separating this group from the next one
        let pos = self.lines.iter().rposition(|line| matches!(line, Line::Entry { .. })).map_or(0, |pos| pos + 1);
        self.lines.insert(pos, Line::Entry { key: key.to_string(), value });
    }

    /// Sets the value of the given key only if the key is already present.
    pub(crate) fn replace(&mut self, key: &str, value: impl Into<String>) -> bool {
        if self.get(key).is_none() {
            return false;
        }
        self.set(key, value);

        true
    }

    /// Removes all occurrences of the given key.
    pub(crate) fn remove(&mut self, key: &str) -> bool {
        let len = self.lines.len();
        self.lines.retain(|line| !matches!(line, Line::Entry { key: k, .. } if k == key));

        len != self.lines.len()
    }
}

/// A parsed desktop entry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DesktopEntry {
    // comments/blank lines before the first group
    preamble: Vec<String>,
    groups: Vec<Group>,
    // index of the first `[Desktop Entry]` group
    main: usize,
}

impl DesktopEntry {
    /// Creates the minimal entry used when the AppImage does not ship one. The launch command is a placeholder that
    /// gets replaced during installation.
    pub(crate) fn placeholder(name: &str) -> Self {
        let mut main = Group::new(MAIN_GROUP);
        main.set("Type", "Application");
        main.set("Name", display_name(name));
        main.set("Exec", "AppRun %U");
        main.set("Terminal", "false");
        main.set("Categories", "Utility;");

        Self {
            preamble: Vec::new(),
            groups: vec![main],
            main: 0,
        }
    }

    /// The `[Desktop Entry]` group.
    pub(crate) fn main(&self) -> &Group {
        &self.groups[self.main]
    }

    /// The `[Desktop Entry]` group, mutable.
    pub(crate) fn main_mut(&mut self) -> &mut Group {
        &mut self.groups[self.main]
    }

    /// All `[Desktop Action ...]` groups, mutable.
    pub(crate) fn actions_mut(&mut self) -> impl Iterator<Item = &mut Group> {
        self.groups.iter_mut().filter(|g| g.is_action())
    }

    /// All groups.
    #[cfg(test)]
    pub(crate) fn groups(&self) -> &[Group] {
        &self.groups
    }
}

impl FromStr for DesktopEntry {
    type Err = DesktopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut preamble = Vec::new();
        let mut groups: Vec<Group> = Vec::new();

        for (idx, raw) in s.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();

            if trimmed.starts_with('[') {
                let Some(name) = trimmed.strip_prefix('[').and_then(|t| t.strip_suffix(']')) else {
                    return Err(DesktopError::MalformedHeader(line_no));
                };
                groups.push(Group::new(name));
                continue;
            }

            let line = match trimmed.split_once('=') {
                Some((key, value)) if !trimmed.starts_with('#') => Line::Entry {
                    key: key.trim_end().to_string(),
                    value: value.trim_start().to_string(),
                },
                _ => Line::Verbatim(raw.to_string()),
            };

            match (groups.last_mut(), line) {
                (Some(group), line) => group.lines.push(line),
                (None, Line::Verbatim(raw)) => preamble.push(raw),
                (None, Line::Entry { .. }) => return Err(DesktopError::EntryOutsideGroup(line_no)),
            }
        }

        let Some(main) = groups.iter().position(|g| g.name == MAIN_GROUP) else {
            return Err(DesktopError::MissingMainGroup);
        };

        Ok(Self { preamble, groups, main })
    }
}

impl fmt::Display for DesktopEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.preamble {
            writeln!(f, "{line}")?;
        }
        for group in &self.groups {
            writeln!(f, "[{}]", group.name)?;
            for line in &group.lines {
                match line {
                    Line::Entry { key, value } => writeln!(f, "{key}={value}")?,
                    Line::Verbatim(raw) => writeln!(f, "{raw}")?,
                }
            }
        }

        Ok(())
    }
}

/// Rewrites an `Exec` value so that it launches the given program with the given flags, keeping all arguments of
/// the replaced program. A leading `env NAME=value ...` is kept and the program following it is replaced instead.
pub(crate) fn rewrite_exec(value: &str, program: &str, flags: &[String]) -> String {
    let (first, mut rest) = split_program(value);
    let mut parts = Vec::new();
    if is_env(first) {
        parts.push(first.to_string());
        loop {
            let (word, remaining) = split_program(rest);
            if !is_assignment(word) {
                break;
            }
            parts.push(word.to_string());
            rest = remaining;
        }
        // drop the program run by env
        rest = split_program(rest).1;
    }

    parts.push(quote_arg(program));
    parts.extend(flags.iter().map(|flag| quote_arg(flag)));
    for arg in rest.split_whitespace() {
        // avoid duplicates when re-installing from an already patched entry
        if !flags.iter().any(|flag| flag == arg) {
            parts.push(arg.to_string());
        }
    }

    parts.join(" ")
}

// Whether the given word runs `env`.
#[doc(hidden)]
fn is_env(word: &str) -> bool {
    word == "env" || word.ends_with("/env")
}

// Whether the given word is an environment assignment (`NAME=value`).
#[doc(hidden)]
fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => !name.is_empty() && name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric()),
        None => false,
    }
}

// Splits an `Exec` value into its first (possibly quoted) word and the remaining arguments.
#[doc(hidden)]
fn split_program(value: &str) -> (&str, &str) {
    let value = value.trim_start();
    if let Some(quoted) = value.strip_prefix('"') {
        // backslashes are escaped once more within the file, so both `\"` and `\\"` are escaped quotes
        let mut backslashes = 0;
        for (idx, c) in quoted.char_indices() {
            match c {
                '\\' => backslashes += 1,
                '"' if backslashes % 4 == 0 => return (&value[..idx + 2], &quoted[idx + 1..]),
                _ => backslashes = 0,
            }
        }
        return (value, "");
    }

    value.split_once(char::is_whitespace).unwrap_or((value, ""))
}

/// Quotes an argument for an `Exec` value if it contains reserved characters. The result is the text as written to
/// the file, i.e. the backslashes of the quoting are escaped once more.
pub(crate) fn quote_arg(arg: &str) -> String {
    const RESERVED: &[char] = &[' ', '\t', '\n', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(', ')', '`'];

    if !arg.is_empty() && !arg.contains(RESERVED) {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        match c {
            '"' | '`' | '$' => quoted.push_str("\\\\"),
            '\\' => quoted.push_str("\\\\\\"),
            _ => {}
        }
        quoted.push(c);
    }
    quoted.push('"');

    quoted
}

// Turns an application name into something suitable for the `Name` key.
#[doc(hidden)]
fn display_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use test_log::test;

    const CURSOR_DESKTOP: &str = "\
# generated by electron-builder
[Desktop Entry]
Name=Cursor
Exec=cursor %F
Icon=co.anysphere.cursor
Type=Application
Categories=Utility;Development;
Actions=new-empty-window;

[Desktop Action new-empty-window]
Name=New Empty Window
Exec=cursor --new-window %F
Icon=co.anysphere.cursor
";

    #[test]
    fn parse_and_print_is_lossless() {
        let entry: DesktopEntry = CURSOR_DESKTOP.parse().unwrap();
        assert_eq!(entry.to_string(), CURSOR_DESKTOP);
        assert_eq!(entry.groups().len(), 2);
        assert_eq!(entry.main().get("Name"), Some("Cursor"));
    }

    #[test]
    fn set_replaces_in_place() {
        let mut entry: DesktopEntry = CURSOR_DESKTOP.parse().unwrap();
        entry.main_mut().set("Icon", "/icons/cursor.png");
        let text = entry.to_string();
        assert!(text.contains("Exec=cursor %F\nIcon=/icons/cursor.png\nType=Application"));
        // actions are untouched
        assert!(text.contains("--new-window %F\nIcon=co.anysphere.cursor\n"));
    }

    #[test]
    fn set_appends_before_trailing_blank_lines() {
        let mut entry: DesktopEntry = CURSOR_DESKTOP.parse().unwrap();
        entry.main_mut().set("StartupWMClass", "Cursor");
        let text = entry.to_string();
        assert!(text.contains("Actions=new-empty-window;\nStartupWMClass=Cursor\n\n[Desktop Action new-empty-window]"));
    }

    #[test]
    fn replace_only_existing() {
        let mut group = Group::new(MAIN_GROUP);
        assert!(!group.replace("TryExec", "x"));
        assert_eq!(group.get("TryExec"), None);
        group.set("TryExec", "a");
        assert!(group.replace("TryExec", "b"));
        assert_eq!(group.get("TryExec"), Some("b"));
    }

    #[test]
    fn remove_key() {
        let mut entry: DesktopEntry = CURSOR_DESKTOP.parse().unwrap();
        assert!(entry.main_mut().remove("Icon"));
        assert!(!entry.main_mut().remove("Icon"));
        assert_eq!(entry.main().get("Icon"), None);
    }

    #[test]
    fn localized_keys_are_distinct() {
        let entry: DesktopEntry = "[Desktop Entry]\nName=Editor\nName[de]=Bearbeiter\n".parse().unwrap();
        assert_eq!(entry.main().get("Name"), Some("Editor"));
        assert_eq!(entry.main().get("Name[de]"), Some("Bearbeiter"));
    }

    #[test]
    fn missing_main_group() {
        let result: Result<DesktopEntry, _> = "[Something]\nName=x\n".parse();
        assert_eq!(result, Err(DesktopError::MissingMainGroup));
    }

    #[test]
    fn entry_outside_group() {
        let result: Result<DesktopEntry, _> = "Name=x\n[Desktop Entry]\n".parse();
        assert_eq!(result, Err(DesktopError::EntryOutsideGroup(1)));
    }

    #[test]
    fn malformed_header() {
        let result: Result<DesktopEntry, _> = "[Desktop Entry\nName=x\n".parse();
        assert_eq!(result, Err(DesktopError::MalformedHeader(1)));
    }

    #[test]
    fn placeholder_is_valid() {
        let entry = DesktopEntry::placeholder("cursor");
        let reparsed: DesktopEntry = entry.to_string().parse().unwrap();
        assert_eq!(reparsed.main().get("Name"), Some("Cursor"));
        assert_eq!(reparsed.main().get("Icon"), None);
        assert_eq!(reparsed, entry);
    }

    #[test]
    fn rewrite_exec_keeps_arguments() {
        let flags = vec!["--no-sandbox".to_string()];
        assert_eq!(rewrite_exec("cursor --new-window %F", "/opt/v/cursor.AppImage", &flags), "/opt/v/cursor.AppImage --no-sandbox --new-window %F");
        assert_eq!(rewrite_exec("AppRun", "/opt/v/a.AppImage", &flags), "/opt/v/a.AppImage --no-sandbox");
    }

    #[test]
    fn rewrite_exec_is_idempotent() {
        let flags = vec!["--no-sandbox".to_string()];
        let once = rewrite_exec("cursor %U", "/v/a.AppImage", &flags);
        let twice = rewrite_exec(&once, "/v/a.AppImage", &flags);
        assert_eq!(once, twice);
    }

    #[test]
    fn rewrite_exec_quoted_program() {
        let flags: Vec<String> = vec![];
        assert_eq!(rewrite_exec(r#""/old path/app" %U"#, "/new path/app", &flags), r#""/new path/app" %U"#);
    }

    #[test]
    fn rewrite_exec_keeps_env_prefix() {
        let flags = vec!["--no-sandbox".to_string()];
        let once = rewrite_exec("env FOO=1 BAR=a=b cursor %F", "/v/a.AppImage", &flags);
        assert_eq!(once, "env FOO=1 BAR=a=b /v/a.AppImage --no-sandbox %F");
        assert_eq!(rewrite_exec(&once, "/v/b.AppImage", &flags), "env FOO=1 BAR=a=b /v/b.AppImage --no-sandbox %F");
        assert_eq!(rewrite_exec("/usr/bin/env cursor", "/v/a.AppImage", &[]), "/usr/bin/env /v/a.AppImage");
    }

    #[test]
    fn rewrite_exec_reserved_program_is_reparsed() {
        let flags = vec!["--no-sandbox".to_string()];
        let once = rewrite_exec("cursor %U", "/home/me/$apps/a.AppImage", &flags);
        assert_eq!(once, r#""/home/me/\\$apps/a.AppImage" --no-sandbox %U"#);
        assert_eq!(rewrite_exec(&once, "/home/me/$apps/a.AppImage", &flags), once);
    }

    #[test]
    fn quote_arg_escapes() {
        assert_eq!(quote_arg("/plain/path"), "/plain/path");
        assert_eq!(quote_arg("/with space"), "\"/with space\"");
        assert_eq!(quote_arg("a$b"), r#""a\\$b""#);
        assert_eq!(quote_arg(r"a\b"), r#""a\\\\b""#);
        assert_eq!(quote_arg(r#"say "hi""#), r#""say \\"hi\\"""#);
        assert_eq!(quote_arg(""), "\"\"");
    }
}
