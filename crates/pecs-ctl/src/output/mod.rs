//! Styled terminal output for `pecs-ctl`.
//!
//! `anstream` strips the ANSI styles when stdout is not a terminal, so
//! command output stays parseable when piped. Machine-readable results
//! (paths, URLs, rendered configs) go through [`plain`].

mod styles;

use std::fmt::Display;
use std::io::Write;

pub(crate) use styles::clap_styles;

use styles::{DETAIL, DIM, ERROR, HEADER, HINT, LABEL, NAME, SUCCESS, WARNING};

/// Print a success message (green checkmark prefix).
pub(crate) fn success(msg: impl Display) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "{SUCCESS}✓{SUCCESS:#} {SUCCESS}{msg}{SUCCESS:#}").ok();
}

/// Print an error message to stderr (red X prefix).
pub(crate) fn error(msg: impl Display) {
    let mut out = anstream::stderr().lock();
    writeln!(out, "{ERROR}✗ {msg}{ERROR:#}").ok();
}

/// Print a warning message (yellow exclamation prefix).
pub(crate) fn warning(msg: impl Display) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "{WARNING}! {msg}{WARNING:#}").ok();
}

pub(crate) fn header(msg: impl Display) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "{HEADER}{msg}{HEADER:#}").ok();
}

/// Print a labeled value ("  Label: value" with the label bolded).
pub(crate) fn label(name: impl Display, value: impl Display) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "  {LABEL}{name}:{LABEL:#} {value}").ok();
}

pub(crate) fn dim(msg: impl Display) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "{DIM}{msg}{DIM:#}").ok();
}

pub(crate) fn hint(msg: impl Display) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "{HINT}{msg}{HINT:#}").ok();
}

/// Print a status line with a green checkmark or a red X.
pub(crate) fn status_icon(ok: bool, msg: impl Display) {
    let mut out = anstream::stdout().lock();
    if ok {
        writeln!(out, "  {SUCCESS}✓{SUCCESS:#} {msg}").ok();
    } else {
        writeln!(out, "  {ERROR}✗{ERROR:#} {msg}").ok();
    }
}

/// Print a list item with a bullet prefix.
pub(crate) fn item(msg: impl Display) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "  • {msg}").ok();
}

/// Print a plugin entry: green bullet, name and italic version, then the
/// description and author on indented lines.
pub(crate) fn plugin(name: &str, version: &str, description: &str, author: &str) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "{}", plugin_line(name, version)).ok();
    if !description.is_empty() {
        writeln!(out, "   {DETAIL}{description}{DETAIL:#}").ok();
    }
    if !author.is_empty() {
        writeln!(out, "   by {DETAIL}{author}{DETAIL:#}").ok();
    }
}

fn plugin_line(name: &str, version: &str) -> String {
    format!("{SUCCESS}•{SUCCESS:#} {NAME}{name}{NAME:#} {DETAIL}{version}{DETAIL:#}")
}

pub(crate) fn blank() {
    let mut out = anstream::stdout().lock();
    writeln!(out).ok();
}

/// Print plain text to stdout (for output that doesn't need styling).
pub(crate) fn plain(msg: impl Display) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "{msg}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_line_styles() {
        let line = plugin_line("ipinfo", "v1.0.0");
        assert!(line.starts_with(&format!("{}•", SUCCESS.render())));
        assert!(line.contains(&format!("{}v1.0.0", DETAIL.render())));

        let plain = anstream::adapter::strip_str(&line).to_string();
        assert_eq!(plain, "• ipinfo v1.0.0");
    }
}
