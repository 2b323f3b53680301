//! Style constants and clap help styling configuration.

use anstyle::{AnsiColor, Color, Effects, Style};

const fn fg(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(Color::Ansi(color)))
}

/// Green: success messages, valid indexes.
pub(crate) const SUCCESS: Style = fg(AnsiColor::Green);

/// Red: errors and validation failures.
pub(crate) const ERROR: Style = fg(AnsiColor::Red);

/// Yellow: warnings and available updates.
pub(crate) const WARNING: Style = fg(AnsiColor::Yellow);

/// Bold: section headers and label names.
pub(crate) const HEADER: Style = Style::new().effects(Effects::BOLD);
pub(crate) const LABEL: Style = Style::new().effects(Effects::BOLD);

/// Bold bright white: plugin names in listings.
pub(crate) const NAME: Style = Style::new()
    .fg_color(Some(Color::Ansi(AnsiColor::BrightWhite)))
    .effects(Effects::BOLD);

/// Italic: plugin versions, descriptions and authors.
pub(crate) const DETAIL: Style = Style::new().effects(Effects::ITALIC);

/// Dimmed: secondary information and hints.
pub(crate) const DIM: Style = Style::new().effects(Effects::DIMMED);
pub(crate) const HINT: Style = Style::new().effects(Effects::DIMMED);

pub(crate) fn clap_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .header(fg(AnsiColor::Green).effects(Effects::BOLD))
        .usage(fg(AnsiColor::Green).effects(Effects::BOLD))
        .literal(fg(AnsiColor::Cyan))
        .placeholder(fg(AnsiColor::Cyan))
        .error(fg(AnsiColor::Red).effects(Effects::BOLD))
        .valid(fg(AnsiColor::Green))
        .invalid(fg(AnsiColor::Yellow))
}
