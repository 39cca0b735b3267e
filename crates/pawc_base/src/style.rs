//! ANSI terminal styling for diagnostics.
//!
//! Small escape-code wrappers used by the diagnostic renderer. Colors reset
//! at the end of each styled fragment. Styling is applied only when the
//! renderer decides output is a terminal; the helpers themselves are
//! unconditional.

/// ANSI escape code styling utilities.
pub struct Style;

impl Style {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const RED: &'static str = "\x1b[31m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const BLUE: &'static str = "\x1b[34m";
    pub const CYAN: &'static str = "\x1b[36m";

    pub fn bold(s: &str) -> String {
        format!("{}{}{}", Self::BOLD, s, Self::RESET)
    }

    pub fn blue(s: &str) -> String {
        format!("{}{}{}", Self::BLUE, s, Self::RESET)
    }

    pub fn cyan(s: &str) -> String {
        format!("{}{}{}", Self::CYAN, s, Self::RESET)
    }

    pub fn bold_red(s: &str) -> String {
        format!("{}{}{}{}", Self::BOLD, Self::RED, s, Self::RESET)
    }

    pub fn bold_yellow(s: &str) -> String {
        format!("{}{}{}{}", Self::BOLD, Self::YELLOW, s, Self::RESET)
    }

    pub fn bold_cyan(s: &str) -> String {
        format!("{}{}{}{}", Self::BOLD, Self::CYAN, s, Self::RESET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_red_wraps_and_resets() {
        let result = Style::bold_red("error");
        assert!(result.starts_with("\x1b[1m\x1b[31m"));
        assert!(result.contains("error"));
        assert!(result.ends_with("\x1b[0m"));
    }

    #[test]
    fn blue_wraps_string() {
        let result = Style::blue("-->");
        assert!(result.contains("\x1b[34m"));
        assert!(result.contains("-->"));
    }
}
