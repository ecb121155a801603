//! Restriction mask matching.
//!
//! A mask is either a plain `nick!user@host` glob or an extended ban such as
//! `$a:account`, `$r:realname`, `$x:nick!user@host#realname`, `$a` (any
//! logged-in user) or `$~a` (any user not logged in).
//!
//! Plain masks are only tried against a user's hostmask; extended masks are
//! only tried against the user's extended candidates. Both sides are
//! case-folded with the network's [`Casemapping`] before comparison, except
//! for the selector in front of an extended ban's `:`.

use bantracker_proto::Casemapping;

/// Collapse runs of wildcards: any run containing a `*` becomes a single `*`
/// with the run's `?`s kept in front of it.
pub fn collapse(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c == '*' || c == '?' {
            let mut star = false;
            while let Some(&w) = chars.peek() {
                match w {
                    '*' => star = true,
                    '?' => out.push('?'),
                    _ => break,
                }
                chars.next();
            }
            if star {
                out.push('*');
            }
        } else {
            out.push(c);
            chars.next();
        }
    }
    out
}

/// Backtracking glob match: `*` matches any run, `?` any single character.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let mut p = 0;
    let mut t = 0;
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star_p = Some(p + 1);
            star_t = t;
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if let Some(sp) = star_p {
            star_t += 1;
            t = star_t;
            p = sp;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Fold a mask for comparison. Extended bans keep their selector as written
/// and fold only the part after the first `:`.
pub fn fold_mask(mask: &str, casemap: Casemapping, extban_prefix: char) -> String {
    if mask.starts_with(extban_prefix) {
        match mask.split_once(':') {
            Some((selector, body)) => format!("{}:{}", selector, casemap.fold(body)),
            None => mask.to_string(),
        }
    } else {
        casemap.fold(mask)
    }
}

/// A compiled restriction mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    text: String,
    pattern: Vec<char>,
    extban: bool,
}

impl Mask {
    /// Fold and collapse `pattern`.
    pub fn compile(pattern: &str, casemap: Casemapping, extban_prefix: char) -> Self {
        let text = collapse(&fold_mask(pattern, casemap, extban_prefix));
        Mask {
            pattern: text.chars().collect(),
            extban: pattern.starts_with(extban_prefix),
            text,
        }
    }

    /// The folded, collapsed form. Two masks with equal text match the same users.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_extban(&self) -> bool {
        self.extban
    }

    /// Match against one already-folded candidate string.
    pub fn matches(&self, candidate: &str) -> bool {
        let text: Vec<char> = candidate.chars().collect();
        glob_match(&self.pattern, &text)
    }

    /// Match against a user's candidates under the prefix discipline.
    pub fn matches_user(&self, candidates: &Candidates) -> bool {
        let pool = if self.extban {
            &candidates.extended
        } else {
            &candidates.plain
        };
        pool.iter().any(|c| glob_match(&self.pattern, c))
    }
}

/// The identity facets a user can be matched on.
#[derive(Debug, Clone, Copy)]
pub struct UserIdentity<'a> {
    pub nick: &'a str,
    pub user: &'a str,
    pub host: &'a str,
    /// `None` when not logged in.
    pub account: Option<&'a str>,
    pub realname: &'a str,
}

impl UserIdentity<'_> {
    pub fn hostmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.user, self.host)
    }
}

/// Folded candidate strings for one user, split by prefix discipline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    plain: Vec<Vec<char>>,
    extended: Vec<Vec<char>>,
}

impl Candidates {
    /// Build the candidates for `identity`.
    ///
    /// `templates` are custom extended-ban forms with `{account}`,
    /// `{hostmask}` and `{realname}` placeholders; a rendered template starting
    /// with `extban_prefix` joins the extended candidates, anything else the
    /// plain ones.
    pub fn build(
        identity: &UserIdentity<'_>,
        casemap: Casemapping,
        extban_prefix: char,
        templates: &[String],
    ) -> Self {
        let hostmask = casemap.fold(&identity.hostmask());
        let realname = casemap.fold(identity.realname);
        let account = identity.account.map(|a| casemap.fold(a));
        let p = extban_prefix;

        let mut plain = vec![hostmask.clone()];
        let mut extended = vec![
            format!("{p}x:{hostmask}#{realname}"),
            format!("{p}r:{realname}"),
        ];
        match &account {
            Some(account) => {
                extended.push(format!("{p}a:{account}"));
                extended.push(format!("{p}a"));
            }
            None => extended.push(format!("{p}~a")),
        }

        for template in templates {
            let rendered = template
                .replace("{account}", account.as_deref().unwrap_or(""))
                .replace("{hostmask}", &hostmask)
                .replace("{realname}", &realname);
            if rendered.starts_with(p) {
                extended.push(rendered);
            } else {
                plain.push(rendered);
            }
        }

        Candidates {
            plain: to_chars(plain),
            extended: to_chars(extended),
        }
    }
}

fn to_chars(strings: Vec<String>) -> Vec<Vec<char>> {
    strings.into_iter().map(|s| s.chars().collect()).collect()
}
