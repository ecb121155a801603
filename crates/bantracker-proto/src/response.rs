//! The IRC numerics bantracker reacts to.
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol
//! - Modern IRC documentation: <https://modern.ircdocs.horse/>

#![allow(non_camel_case_types)]

/// IRC server response code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Response {
    /// 001 - Welcome to the IRC network
    RPL_WELCOME = 1,
    /// 005 - Server supported features (ISUPPORT)
    RPL_ISUPPORT = 5,
    /// 315 - End of WHO list
    RPL_ENDOFWHO = 315,
    /// 352 - WHO reply
    RPL_WHOREPLY = 352,
    /// 353 - NAMES reply
    RPL_NAMREPLY = 353,
    /// 354 - WHOX reply
    RPL_WHOSPCRPL = 354,
    /// 366 - End of NAMES list
    RPL_ENDOFNAMES = 366,
    /// 367 - Ban list entry
    RPL_BANLIST = 367,
    /// 368 - End of ban list
    RPL_ENDOFBANLIST = 368,
    /// 432 - Erroneous nickname
    ERR_ERRONEUSNICKNAME = 432,
    /// 433 - Nickname is already in use
    ERR_NICKNAMEINUSE = 433,
    /// 482 - You're not channel operator
    ERR_CHANOPRIVSNEEDED = 482,
    /// 728 - Quiet list entry
    RPL_QUIETLIST = 728,
    /// 729 - End of quiet list
    RPL_ENDOFQUIETLIST = 729,
}

impl Response {
    /// Look up a numeric code.
    pub fn from_code(code: u16) -> Option<Response> {
        use Response::*;
        Some(match code {
            1 => RPL_WELCOME,
            5 => RPL_ISUPPORT,
            315 => RPL_ENDOFWHO,
            352 => RPL_WHOREPLY,
            353 => RPL_NAMREPLY,
            354 => RPL_WHOSPCRPL,
            366 => RPL_ENDOFNAMES,
            367 => RPL_BANLIST,
            368 => RPL_ENDOFBANLIST,
            432 => ERR_ERRONEUSNICKNAME,
            433 => ERR_NICKNAMEINUSE,
            482 => ERR_CHANOPRIVSNEEDED,
            728 => RPL_QUIETLIST,
            729 => RPL_ENDOFQUIETLIST,
            _ => return None,
        })
    }

    /// The numeric code.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Three-digit wire form, e.g. `"005"`.
    pub fn as_command(self) -> String {
        format!("{:03}", self.code())
    }

    /// Whether this is an error reply (400-599).
    #[inline]
    pub fn is_error(self) -> bool {
        (400..600).contains(&self.code())
    }
}

impl crate::Message {
    /// The known [`Response`] this message carries, if any.
    pub fn response(&self) -> Option<Response> {
        self.numeric().and_then(Response::from_code)
    }
}
