//! Owned IRC messages.
//!
//! Parsing uses nom for the fixed-position parts (tags, prefix, command) and a
//! hand loop for parameters, so that runs of spaces and the trailing parameter
//! follow RFC 1459 rules.

use std::fmt::{self, Display, Formatter, Write};
use std::str::FromStr;

use nom::{
    bytes::complete::{take_until, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    error::ErrorKind,
    sequence::preceded,
    IResult,
};
use smallvec::SmallVec;

use crate::error::{MessageParseError, ProtocolError};
use crate::prefix::Prefix;

/// An IRCv3 message tag: key and optional (unescaped) value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tag(pub String, pub Option<String>);

/// An owned IRC message.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    /// IRCv3 message tags.
    pub tags: Option<Vec<Tag>>,
    /// Message source.
    pub prefix: Option<Prefix>,
    /// Upper-cased command name or three-digit numeric.
    pub command: String,
    /// Parameters, the trailing one included as the last element.
    pub params: Vec<String>,
}

fn parse_tags(input: &str) -> IResult<&str, &str> {
    preceded(char('@'), take_until(" "))(input)
}

fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

/// command = 1*letter / 3digit
fn parse_command(input: &str) -> IResult<&str, &str> {
    let (rest, cmd) = take_while1(|c: char| c.is_ascii_alphanumeric())(input)?;

    let is_all_letters = cmd.chars().all(|c| c.is_ascii_alphabetic());
    let is_three_digits = cmd.len() == 3 && cmd.chars().all(|c| c.is_ascii_digit());

    if is_all_letters || is_three_digits {
        Ok((rest, cmd))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::AlphaNumeric,
        )))
    }
}

/// Split the parameter section. At most 15 parameters are produced; the
/// trailing parameter keeps its spaces.
fn parse_params(input: &str) -> SmallVec<[&str; 15]> {
    let mut params: SmallVec<[&str; 15]> = SmallVec::new();
    let mut rest = input;

    while rest.starts_with(' ') {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }

        if params.len() == 14 || rest.starts_with(':') {
            params.push(rest.strip_prefix(':').unwrap_or(rest));
            break;
        }

        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    params
}

fn unescape_tag_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let r = if c == '\\' {
            match iter.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(c) => c,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(r);
    }
    unescaped
}

fn escape_tag_value(f: &mut Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            ';' => f.write_str("\\:")?,
            ' ' => f.write_str("\\s")?,
            '\\' => f.write_str("\\\\")?,
            '\r' => f.write_str("\\r")?,
            '\n' => f.write_str("\\n")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

fn parse_tags_string(tags_str: &str) -> Vec<Tag> {
    tags_str
        .split(';')
        .filter(|s| !s.is_empty())
        .map(|tag| match tag.split_once('=') {
            Some((key, value)) => Tag(key.to_string(), Some(unescape_tag_value(value))),
            None => Tag(tag.to_string(), None),
        })
        .collect()
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage {
                string: s.to_owned(),
                cause: MessageParseError::EmptyMessage,
            });
        }

        let invalid = |rest: &str| ProtocolError::InvalidMessage {
            string: s.to_owned(),
            cause: MessageParseError::InvalidCommand {
                position: line.len() - rest.len(),
            },
        };

        let (input, tags) = opt(parse_tags)(line).map_err(|_| invalid(line))?;
        let (input, _) = space0::<_, nom::error::Error<&str>>(input).map_err(|_| invalid(input))?;
        let (input, prefix) = opt(parse_prefix)(input).map_err(|_| invalid(input))?;
        let (input, _) = space0::<_, nom::error::Error<&str>>(input).map_err(|_| invalid(input))?;
        let (input, command) = parse_command(input).map_err(|_| invalid(input))?;
        let params = parse_params(input);

        Ok(Message {
            tags: tags.map(parse_tags_string),
            prefix: prefix.map(Prefix::new_from_str),
            command: command.to_ascii_uppercase(),
            params: params.iter().map(|p| p.to_string()).collect(),
        })
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(ref tags) = self.tags {
            f.write_char('@')?;
            for (i, Tag(key, value)) in tags.iter().enumerate() {
                if i > 0 {
                    f.write_char(';')?;
                }
                f.write_str(key)?;
                if let Some(value) = value {
                    f.write_char('=')?;
                    escape_tag_value(f, value)?;
                }
            }
            f.write_char(' ')?;
        }

        if let Some(ref prefix) = self.prefix {
            write!(f, ":{} ", prefix)?;
        }

        f.write_str(&self.command)?;

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {}", param)?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }

        Ok(())
    }
}

impl Message {
    /// Build a message from a command and its parameters.
    pub fn new<C, I, P>(command: C, params: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Message {
            tags: None,
            prefix: None,
            command: command.into().to_ascii_uppercase(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    fn from_parts(command: &str, params: Vec<String>) -> Self {
        Message {
            tags: None,
            prefix: None,
            command: command.to_string(),
            params,
        }
    }

    /// Attach a prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Get the nickname from the message prefix, if present.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }

    /// Get the value of an IRCv3 tag by key.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .as_ref()?
            .iter()
            .find(|Tag(k, _)| k == key)
            .and_then(|Tag(_, v)| v.as_deref())
    }

    /// Get a parameter by index.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The numeric code, if the command is a three-digit reply.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Create a PRIVMSG message.
    #[must_use]
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::from_parts("PRIVMSG", vec![target.into(), text.into()])
    }

    /// Create a NOTICE message.
    #[must_use]
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::from_parts("NOTICE", vec![target.into(), text.into()])
    }

    /// Create a JOIN message for one or more comma-separated channels.
    #[must_use]
    pub fn join(channels: impl Into<String>) -> Self {
        Self::from_parts("JOIN", vec![channels.into()])
    }

    /// Create a MODE message: `MODE <target> <modes> [args...]`.
    #[must_use]
    pub fn mode<A>(target: impl Into<String>, modes: impl Into<String>, args: A) -> Self
    where
        A: IntoIterator<Item = String>,
    {
        let mut params = vec![target.into(), modes.into()];
        params.extend(args);
        Self::from_parts("MODE", params)
    }

    /// Create a KICK message with a reason.
    #[must_use]
    pub fn kick(
        channel: impl Into<String>,
        nick: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::from_parts("KICK", vec![channel.into(), nick.into(), reason.into()])
    }

    /// Create a PING message.
    #[must_use]
    pub fn ping(token: impl Into<String>) -> Self {
        Self::from_parts("PING", vec![token.into()])
    }

    /// Create a PONG message.
    #[must_use]
    pub fn pong(token: impl Into<String>) -> Self {
        Self::from_parts("PONG", vec![token.into()])
    }

    /// Create a WHOX query: `WHO <mask> %<fields>,<token>`.
    #[must_use]
    pub fn whox(mask: impl Into<String>, fields: &str, token: &str) -> Self {
        Self::from_parts("WHO", vec![mask.into(), format!("%{},{}", fields, token)])
    }

    /// Create a NICK message.
    #[must_use]
    pub fn nick(nick: impl Into<String>) -> Self {
        Self::from_parts("NICK", vec![nick.into()])
    }

    /// Create a USER message.
    #[must_use]
    pub fn user(username: impl Into<String>, realname: impl Into<String>) -> Self {
        Self::from_parts(
            "USER",
            vec![username.into(), "0".to_string(), "*".to_string(), realname.into()],
        )
    }

    /// Create a CAP message.
    #[must_use]
    pub fn cap<I, P>(params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Message::new("CAP", params)
    }
}
