//! Channel and user mode grammar.
//!
//! Channel modes fall into four classes that determine parameter
//! consumption as the mode string is scanned left to right:
//!
//! - Type A (list with parameter): `b`, `e`, `I` — a missing parameter
//!   turns the letter into a list query.
//! - Type B (always parameter): `k` and the member modes `o v h a q`.
//! - Type C (parameter only when set): `l`.
//! - Type D (no parameter): `i m n s t p C c S R`.

use std::fmt::Write;

use thiserror::Error;

/// Member-mode letters paired with their NAMES/WHO prefix characters, in
/// precedence order (owner first).
pub const MEMBER_MODES: &[(char, char)] = &[
    ('q', '~'),
    ('a', '&'),
    ('o', '@'),
    ('h', '%'),
    ('v', '+'),
];

/// Mode classes per the RFC 2811 / ISUPPORT CHANMODES grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeClass {
    /// Type A: list modes, parameter is a mask; no parameter = list query.
    ListWithParam,
    /// Type B: always takes a parameter.
    AlwaysParam,
    /// Type C: parameter only when setting.
    ParamWhenSet,
    /// Type D: never takes a parameter.
    NoParam,
}

/// Channel mode letter classification.
pub struct ChannelModeSpec;

impl ChannelModeSpec {
    /// The class of a channel mode letter, or `None` if unknown.
    pub fn class(letter: char) -> Option<ModeClass> {
        match letter {
            'b' | 'e' | 'I' => Some(ModeClass::ListWithParam),
            'k' | 'o' | 'v' | 'h' | 'a' | 'q' => Some(ModeClass::AlwaysParam),
            'l' => Some(ModeClass::ParamWhenSet),
            'i' | 'm' | 'n' | 's' | 't' | 'p' | 'C' | 'c' | 'S' | 'R' => Some(ModeClass::NoParam),
            _ => None,
        }
    }

    /// Whether the letter changes a member's channel privileges.
    pub fn is_member_mode(letter: char) -> bool {
        matches!(letter, 'o' | 'v' | 'h' | 'a' | 'q')
    }

    /// The ISUPPORT `CHANMODES=` value for this grammar.
    pub fn isupport_value() -> &'static str {
        "beI,k,l,imnstpCcSR"
    }
}

/// One applied (or requested) mode change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeChange {
    pub adding: bool,
    pub letter: char,
    pub arg: Option<String>,
}

/// The outcome of scanning a mode string with its parameters.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedModes {
    /// Changes in scan order with their consumed parameters.
    pub changes: Vec<ModeChange>,
    /// Unknown letters, in scan order.
    pub unknown: Vec<char>,
    /// Type A letters that appeared without a parameter (list queries).
    pub list_queries: Vec<char>,
}

/// Errors from mode-string scanning.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeParseError {
    #[error("empty mode string")]
    Empty,
}

/// Scan a channel mode string, consuming parameters in order.
///
/// A single `+`/`-` flips direction for subsequent letters. Letters whose
/// class requires a parameter that is not available are either downgraded
/// to list queries (type A) or dropped (types B/C).
pub fn parse_channel_modes(modestr: &str, args: &[&str]) -> Result<ParsedModes, ModeParseError> {
    if modestr.is_empty() {
        return Err(ModeParseError::Empty);
    }

    let mut parsed = ParsedModes::default();
    let mut adding = true;
    let mut next_arg = 0usize;
    let mut take = |next_arg: &mut usize| -> Option<String> {
        let arg = args.get(*next_arg).map(|s| s.to_string());
        if arg.is_some() {
            *next_arg += 1;
        }
        arg
    };

    for letter in modestr.chars() {
        match letter {
            '+' => adding = true,
            '-' => adding = false,
            letter => match ChannelModeSpec::class(letter) {
                Some(ModeClass::ListWithParam) => match take(&mut next_arg) {
                    Some(arg) => parsed.changes.push(ModeChange {
                        adding,
                        letter,
                        arg: Some(arg),
                    }),
                    None => parsed.list_queries.push(letter),
                },
                Some(ModeClass::AlwaysParam) => {
                    if let Some(arg) = take(&mut next_arg) {
                        parsed.changes.push(ModeChange {
                            adding,
                            letter,
                            arg: Some(arg),
                        });
                    }
                }
                Some(ModeClass::ParamWhenSet) => {
                    if adding {
                        if let Some(arg) = take(&mut next_arg) {
                            parsed.changes.push(ModeChange {
                                adding,
                                letter,
                                arg: Some(arg),
                            });
                        }
                    } else {
                        parsed.changes.push(ModeChange {
                            adding,
                            letter,
                            arg: None,
                        });
                    }
                }
                Some(ModeClass::NoParam) => parsed.changes.push(ModeChange {
                    adding,
                    letter,
                    arg: None,
                }),
                None => parsed.unknown.push(letter),
            },
        }
    }

    Ok(parsed)
}

/// Render applied changes in canonical grouped form.
///
/// Returns the mode string and the parameter list, e.g.
/// `("+ov-b", ["alice", "bob", "*!*@spam"])`.
pub fn format_mode_changes(changes: &[ModeChange]) -> (String, Vec<String>) {
    let mut modes = String::new();
    let mut args = Vec::new();
    let mut direction: Option<bool> = None;

    for change in changes {
        if direction != Some(change.adding) {
            modes.push(if change.adding { '+' } else { '-' });
            direction = Some(change.adding);
        }
        modes.push(change.letter);
        if let Some(ref arg) = change.arg {
            args.push(arg.clone());
        }
    }
    (modes, args)
}

/// Scan a user mode string (`+iw-o` style); returns `(adding, letter)` pairs
/// and the unknown letters.
pub fn parse_user_modes(modestr: &str, known: &str) -> (Vec<(bool, char)>, Vec<char>) {
    let mut changes = Vec::new();
    let mut unknown = Vec::new();
    let mut adding = true;
    for letter in modestr.chars() {
        match letter {
            '+' => adding = true,
            '-' => adding = false,
            letter if known.contains(letter) => changes.push((adding, letter)),
            letter => unknown.push(letter),
        }
    }
    (changes, unknown)
}

/// Render a channel member's visible prefixes in precedence order.
///
/// With `multi_prefix` every earned prefix is shown; otherwise only the
/// highest.
pub fn member_prefixes(letters: &[char], multi_prefix: bool) -> String {
    let mut out = String::new();
    for (letter, prefix) in MEMBER_MODES {
        if letters.contains(letter) {
            out.push(*prefix);
            if !multi_prefix {
                break;
            }
        }
    }
    out
}

/// The ISUPPORT `PREFIX=` value for this grammar.
pub fn prefix_isupport_value() -> String {
    let mut letters = String::new();
    let mut prefixes = String::new();
    for (letter, prefix) in MEMBER_MODES {
        letters.push(*letter);
        prefixes.push(*prefix);
    }
    let mut out = String::new();
    let _ = write!(out, "({}){}", letters, prefixes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(ChannelModeSpec::class('b'), Some(ModeClass::ListWithParam));
        assert_eq!(ChannelModeSpec::class('k'), Some(ModeClass::AlwaysParam));
        assert_eq!(ChannelModeSpec::class('l'), Some(ModeClass::ParamWhenSet));
        assert_eq!(ChannelModeSpec::class('m'), Some(ModeClass::NoParam));
        assert_eq!(ChannelModeSpec::class('x'), None);
    }

    #[test]
    fn params_consumed_in_order() {
        let parsed = parse_channel_modes("+ovk", &["alice", "bob", "hunter2"]).unwrap();
        assert_eq!(parsed.changes.len(), 3);
        assert_eq!(parsed.changes[0].arg.as_deref(), Some("alice"));
        assert_eq!(parsed.changes[1].arg.as_deref(), Some("bob"));
        assert_eq!(parsed.changes[2].arg.as_deref(), Some("hunter2"));
    }

    #[test]
    fn direction_flips() {
        let parsed = parse_channel_modes("+m-n+t", &[]).unwrap();
        let dirs: Vec<bool> = parsed.changes.iter().map(|c| c.adding).collect();
        assert_eq!(dirs, vec![true, false, true]);
    }

    #[test]
    fn ban_without_mask_is_list_query() {
        let parsed = parse_channel_modes("+b", &[]).unwrap();
        assert!(parsed.changes.is_empty());
        assert_eq!(parsed.list_queries, vec!['b']);
    }

    #[test]
    fn limit_param_only_when_set() {
        let parsed = parse_channel_modes("+l", &["25"]).unwrap();
        assert_eq!(parsed.changes[0].arg.as_deref(), Some("25"));

        let parsed = parse_channel_modes("-l", &["ignored"]).unwrap();
        assert_eq!(parsed.changes[0].arg, None);
    }

    #[test]
    fn unknown_letters_collected() {
        let parsed = parse_channel_modes("+mxz", &[]).unwrap();
        assert_eq!(parsed.unknown, vec!['x', 'z']);
        assert_eq!(parsed.changes.len(), 1);
    }

    #[test]
    fn canonical_grouping() {
        let changes = vec![
            ModeChange { adding: true, letter: 'o', arg: Some("alice".into()) },
            ModeChange { adding: true, letter: 'v', arg: Some("bob".into()) },
            ModeChange { adding: false, letter: 'b', arg: Some("*!*@spam".into()) },
        ];
        let (modes, args) = format_mode_changes(&changes);
        assert_eq!(modes, "+ov-b");
        assert_eq!(args, vec!["alice", "bob", "*!*@spam"]);
    }

    #[test]
    fn member_prefix_precedence() {
        assert_eq!(member_prefixes(&['v', 'o'], false), "@");
        assert_eq!(member_prefixes(&['v', 'o'], true), "@+");
        assert_eq!(member_prefixes(&['q', 'o', 'v'], true), "~@+");
        assert_eq!(member_prefixes(&[], true), "");
    }

    #[test]
    fn isupport_values() {
        assert_eq!(prefix_isupport_value(), "(qaohv)~&@%+");
        assert_eq!(ChannelModeSpec::isupport_value(), "beI,k,l,imnstpCcSR");
    }
}
