//! `RPL_ISUPPORT` (005) state.
//!
//! Servers advertise their limits and mode classes over one or more 005
//! replies. [`Isupport`] starts from RFC 1459 defaults and is updated in place
//! as each reply arrives.

use crate::casemap::Casemapping;

/// Parsed `PREFIX` token: status modes and their symbols, highest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixSpec {
    /// Mode characters (e.g., `ov`).
    pub modes: String,
    /// Prefix symbols (e.g., `@+`).
    pub symbols: String,
}

impl Default for PrefixSpec {
    fn default() -> Self {
        PrefixSpec {
            modes: "ov".to_string(),
            symbols: "@+".to_string(),
        }
    }
}

impl PrefixSpec {
    /// Parse a `PREFIX` value like `(ov)@+`.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix('(')?;
        let (modes, symbols) = rest.split_once(')')?;
        if modes.chars().count() != symbols.chars().count() {
            return None;
        }
        Some(PrefixSpec {
            modes: modes.to_string(),
            symbols: symbols.to_string(),
        })
    }

    /// Returns true if `mode` is a status mode on this server.
    #[inline]
    pub fn is_prefix_mode(&self, mode: char) -> bool {
        self.modes.contains(mode)
    }

    /// Returns the mode character for a given prefix symbol.
    pub fn mode_for_symbol(&self, symbol: char) -> Option<char> {
        self.symbols
            .chars()
            .position(|c| c == symbol)
            .and_then(|i| self.modes.chars().nth(i))
    }
}

/// Parsed `CHANMODES` token.
///
/// - **A**: list modes, always take a parameter (`b`)
/// - **B**: always take a parameter (`k`)
/// - **C**: take a parameter only when set (`l`)
/// - **D**: never take a parameter (`n`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChanModes {
    /// Type A.
    pub a: String,
    /// Type B.
    pub b: String,
    /// Type C.
    pub c: String,
    /// Type D.
    pub d: String,
}

impl Default for ChanModes {
    fn default() -> Self {
        ChanModes {
            a: "beI".to_string(),
            b: "k".to_string(),
            c: "l".to_string(),
            d: "imnpst".to_string(),
        }
    }
}

impl ChanModes {
    /// Parse a `CHANMODES` value like `eIbq,k,flj,CFLMPQScgimnprstz`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(4, ',');
        Some(ChanModes {
            a: parts.next()?.to_string(),
            b: parts.next()?.to_string(),
            c: parts.next()?.to_string(),
            d: parts.next()?.to_string(),
        })
    }
}

/// Parsed `EXTBAN` token: the selector prefix and the selector letters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtbanSpec {
    /// Prefix introducing an extended ban (`$` on most networks).
    pub prefix: char,
    /// Supported selector letters.
    pub types: String,
}

impl Default for ExtbanSpec {
    fn default() -> Self {
        ExtbanSpec {
            prefix: '$',
            types: String::new(),
        }
    }
}

impl ExtbanSpec {
    /// Parse an `EXTBAN` value like `$,ajrxz`.
    pub fn parse(s: &str) -> Option<Self> {
        let (prefix, types) = s.split_once(',').unwrap_or((s, ""));
        let mut chars = prefix.chars();
        let prefix = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Some(ExtbanSpec {
            prefix,
            types: types.to_string(),
        })
    }
}

/// Accumulated server capabilities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Isupport {
    /// `CASEMAPPING`.
    pub casemapping: Casemapping,
    /// `MODES`: maximum parameterised mode changes per MODE command.
    pub modes: usize,
    /// `CHANMODES`.
    pub chanmodes: ChanModes,
    /// `PREFIX`.
    pub prefix: PrefixSpec,
    /// `CHANTYPES`.
    pub chantypes: String,
    /// `EXTBAN`.
    pub extban: ExtbanSpec,
    /// `NETWORK`, when advertised.
    pub network: Option<String>,
}

impl Default for Isupport {
    fn default() -> Self {
        Isupport {
            casemapping: Casemapping::Rfc1459,
            modes: 3,
            chanmodes: ChanModes::default(),
            prefix: PrefixSpec::default(),
            chantypes: "#&".to_string(),
            extban: ExtbanSpec::default(),
            network: None,
        }
    }
}

impl Isupport {
    /// Apply the tokens of one 005 reply.
    ///
    /// `params` are the reply's parameters: the leading target nickname and
    /// the trailing human-readable text are skipped.
    pub fn apply_reply(&mut self, params: &[String]) {
        let Some((_, tokens)) = params.split_first() else {
            return;
        };
        let tokens = match tokens.split_last() {
            Some((last, rest)) if last.contains(' ') => rest,
            _ => tokens,
        };
        for token in tokens {
            self.apply_token(token);
        }
    }

    /// Apply a single `KEY`, `KEY=VALUE` or `-KEY` token.
    pub fn apply_token(&mut self, token: &str) {
        if let Some(key) = token.strip_prefix('-') {
            self.reset(key);
            return;
        }
        let (key, value) = token.split_once('=').unwrap_or((token, ""));

        match key.to_ascii_uppercase().as_str() {
            "CASEMAPPING" => self.casemapping = Casemapping::from_token(value),
            "MODES" => {
                // MODES without a value means "no limit"; cap it at something sane.
                self.modes = value.parse().unwrap_or(if value.is_empty() { 12 } else { 3 });
            }
            "CHANMODES" => {
                if let Some(chanmodes) = ChanModes::parse(value) {
                    self.chanmodes = chanmodes;
                }
            }
            "PREFIX" => {
                if let Some(prefix) = PrefixSpec::parse(value) {
                    self.prefix = prefix;
                }
            }
            "CHANTYPES" => self.chantypes = value.to_string(),
            "EXTBAN" => {
                if let Some(extban) = ExtbanSpec::parse(value) {
                    self.extban = extban;
                }
            }
            "NETWORK" => self.network = Some(value.to_string()),
            _ => {}
        }
    }

    fn reset(&mut self, key: &str) {
        let defaults = Isupport::default();
        match key.to_ascii_uppercase().as_str() {
            "CASEMAPPING" => self.casemapping = defaults.casemapping,
            "MODES" => self.modes = defaults.modes,
            "CHANMODES" => self.chanmodes = defaults.chanmodes,
            "PREFIX" => self.prefix = defaults.prefix,
            "CHANTYPES" => self.chantypes = defaults.chantypes,
            "EXTBAN" => self.extban = defaults.extban,
            "NETWORK" => self.network = None,
            _ => {}
        }
    }

    /// Whether `target` names a channel on this network.
    pub fn is_channel(&self, target: &str) -> bool {
        target
            .chars()
            .next()
            .is_some_and(|c| self.chantypes.contains(c))
    }
}
