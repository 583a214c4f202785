use console::style;
use std::fmt::Display;

/// White bold: table headers
pub fn header<D: Display>(text: D) -> String {
    style(text).white().bold().to_string()
}

/// Dim: secondary text, empty-state notes
pub fn dim<D: Display>(text: D) -> String {
    style(text).dim().to_string()
}

/// Cyan underlined: public URLs
pub fn url<D: Display>(text: D) -> String {
    style(text).cyan().underlined().to_string()
}

/// Cyan: method names
pub fn method<D: Display>(text: D) -> String {
    style(text).cyan().to_string()
}

/// Yellow: suggestions printed after a failure
pub fn hint<D: Display>(text: D) -> String {
    style(text).yellow().to_string()
}

/// `alive` in green or `dead` in red, for `list --verify`
pub fn liveness(alive: bool) -> String {
    if alive {
        style("alive").green().bold().to_string()
    } else {
        style("dead").red().to_string()
    }
}
