//! Channel mode-string tokenizing.
//!
//! A single MODE line can carry many changes (`+bq-v mask1 mask2 nick`).
//! Which letters consume an argument depends on the server's `PREFIX` and
//! `CHANMODES` classes, so tokenizing needs the current [`Isupport`].

use crate::isupport::Isupport;

/// One change from a mode string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeChange {
    /// `true` for `+`, `false` for `-`.
    pub add: bool,
    /// The mode letter.
    pub mode: char,
    /// The argument, when this letter consumes one.
    pub arg: Option<String>,
}

impl ModeChange {
    /// Create a new change.
    pub fn new(add: bool, mode: char, arg: Option<String>) -> Self {
        ModeChange { add, mode, arg }
    }
}

fn takes_arg(isupport: &Isupport, add: bool, mode: char) -> bool {
    let chanmodes = &isupport.chanmodes;
    if isupport.prefix.is_prefix_mode(mode)
        || chanmodes.a.contains(mode)
        || chanmodes.b.contains(mode)
    {
        true
    } else if chanmodes.c.contains(mode) {
        add
    } else {
        false
    }
}

/// Split `modes` (e.g. `+bq-o`) into individual changes, pairing each
/// argument-taking letter with the next entry of `args`.
///
/// Changes appear in the order they were written. A letter that should take
/// an argument but finds none left is still reported, with `arg: None`
/// (list queries look like this).
pub fn parse_channel_modes(modes: &str, args: &[String], isupport: &Isupport) -> Vec<ModeChange> {
    let mut changes = Vec::new();
    let mut args = args.iter();
    let mut add = true;

    for c in modes.chars() {
        match c {
            '+' => add = true,
            '-' => add = false,
            _ => {
                let arg = if takes_arg(isupport, add, c) {
                    args.next().cloned()
                } else {
                    None
                };
                changes.push(ModeChange::new(add, c, arg));
            }
        }
    }

    changes
}
