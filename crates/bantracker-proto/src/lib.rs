//! # bantracker-proto
//!
//! The slice of the IRC client protocol that bantracker needs:
//!
//! - message parsing and serialization (tags, prefix, command, parameters)
//! - a tokio line codec producing [`Message`] values
//! - network case-mapping (`ascii`, `rfc1459`, `strict-rfc1459`)
//! - incremental `RPL_ISUPPORT` state
//! - channel mode-string tokenizing that honours `CHANMODES` and `PREFIX`
//!
//! ## Parsing
//!
//! ```rust
//! use bantracker_proto::Message;
//!
//! let msg: Message = ":op!o@staff/op MODE #chan +b *!*@bad.host".parse().unwrap();
//! assert_eq!(msg.command, "MODE");
//! assert_eq!(msg.source_nickname(), Some("op"));
//! assert_eq!(msg.params, vec!["#chan", "+b", "*!*@bad.host"]);
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod codec;
pub mod error;
pub mod isupport;
pub mod message;
pub mod mode;
pub mod prefix;
pub mod response;

pub use self::casemap::Casemapping;
pub use self::codec::IrcCodec;
pub use self::error::{MessageParseError, ProtocolError};
pub use self::isupport::{ChanModes, ExtbanSpec, Isupport, PrefixSpec};
pub use self::message::{Message, Tag};
pub use self::mode::{parse_channel_modes, ModeChange};
pub use self::prefix::Prefix;
pub use self::response::Response;
