//! mIRC formatting codes.
//!
//! Used by the `+c` (no colors) and `+S` (strip colors) channel modes and
//! for CTCP detection.

/// Formatting control characters.
const BOLD: char = '\x02';
const COLOR: char = '\x03';
const RESET: char = '\x0f';
const REVERSE: char = '\x16';
const ITALIC: char = '\x1d';
const UNDERLINE: char = '\x1f';
const CTCP_DELIM: char = '\x01';

/// Whether the text contains any mIRC color or formatting codes.
pub fn has_formatting(text: &str) -> bool {
    text.chars()
        .any(|c| matches!(c, BOLD | COLOR | RESET | REVERSE | ITALIC | UNDERLINE))
}

/// Strip mIRC color and formatting codes.
///
/// Color codes consume up to `NN[,NN]` digits after `\x03`.
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            BOLD | RESET | REVERSE | ITALIC | UNDERLINE => {}
            COLOR => {
                // Foreground: up to two digits.
                for _ in 0..2 {
                    if chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                        chars.next();
                    }
                }
                // Optional ",NN" background.
                if chars.peek() == Some(&',') {
                    let mut ahead = chars.clone();
                    ahead.next();
                    if ahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                        chars.next();
                        for _ in 0..2 {
                            if chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                                chars.next();
                            }
                        }
                    }
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Whether the text is a CTCP message (`\x01`-delimited).
pub fn is_ctcp(text: &str) -> bool {
    text.starts_with(CTCP_DELIM)
}

/// Whether the text is a CTCP ACTION (`/me`).
pub fn is_action(text: &str) -> bool {
    text.strip_prefix(CTCP_DELIM)
        .is_some_and(|rest| rest.starts_with("ACTION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_formatting() {
        assert!(has_formatting("\x02bold\x02"));
        assert!(has_formatting("\x034red"));
        assert!(!has_formatting("plain text"));
    }

    #[test]
    fn strips_colors() {
        assert_eq!(strip_formatting("\x034,12hello\x03 there"), "hello there");
        assert_eq!(strip_formatting("\x02bold\x02 \x1funder\x1f"), "bold under");
        assert_eq!(strip_formatting("plain"), "plain");
    }

    #[test]
    fn color_comma_without_digits_survives() {
        assert_eq!(strip_formatting("\x034,x"), ",x");
    }

    #[test]
    fn ctcp_detection() {
        assert!(is_ctcp("\x01VERSION\x01"));
        assert!(is_action("\x01ACTION waves\x01"));
        assert!(!is_action("\x01VERSION\x01"));
        assert!(!is_ctcp("hello"));
    }
}
