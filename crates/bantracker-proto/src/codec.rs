//! Tokio codec for IRC lines.
//!
//! Decodes newline-terminated lines into [`Message`] values and encodes
//! messages back with a CRLF terminator.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{self, ProtocolError};
use crate::message::Message;

/// Default maximum line length: 8191 bytes of tags plus 512 bytes of message.
pub const MAX_LINE_LEN: usize = 8191 + 512;

/// Line codec yielding parsed [`Message`]s.
#[derive(Debug, Clone)]
pub struct IrcCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    max_len: usize,
}

impl Default for IrcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl IrcCodec {
    /// Create a codec with the default maximum line length.
    pub fn new() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }

    /// Create a codec with a custom maximum line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }

    /// Strip everything from the first line ending onwards so a parameter
    /// can never smuggle a second command onto the wire.
    pub fn sanitize(mut data: String) -> String {
        if let Some(pos) = data.find(['\r', '\n', '\0']) {
            data.truncate(pos);
        }
        data
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                if src.len() > self.max_len {
                    return Err(ProtocolError::LineTooLong {
                        actual: src.len(),
                        limit: self.max_len,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(ProtocolError::LineTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            let text = std::str::from_utf8(&line).map_err(|e| ProtocolError::InvalidUtf8 {
                byte_pos: e.valid_up_to(),
            })?;

            // Servers occasionally send bare keepalive newlines.
            if text.trim().is_empty() {
                continue;
            }

            return text.parse::<Message>().map(Some);
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> error::Result<()> {
        let line = Self::sanitize(msg.to_string());
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
