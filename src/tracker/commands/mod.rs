//! Administrative commands sent as channel or private messages.
//!
//! A message is a command when it starts with the trigger of the channel it
//! was sent to (or the global trigger in private). Every outcome, success or
//! error, is acknowledged to the issuer by NOTICE.

mod comment;
mod duration;
mod set;

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use bantracker_proto::{Message, Prefix};
use tracing::{debug, warn};

pub use duration::parse_duration;

use super::Context;
use crate::client::Connection;
use crate::error::{ClientError, CommandError};

/// One parsed command invocation.
pub struct Request<'a> {
    pub ctx: &'a Context,
    pub conn: &'a Connection,
    pub source: &'a Prefix,
    pub nick: &'a str,
    /// The channel the command was sent to, if any.
    pub channel: Option<&'a str>,
    /// Everything after the command word.
    pub args: &'a str,
}

/// A command handler. Returns the acknowledgement text.
#[async_trait]
pub trait Command: Send + Sync {
    async fn run(&self, req: &Request<'_>) -> Result<String, CommandError>;
}

static COMMANDS: LazyLock<HashMap<&'static str, Box<dyn Command>>> = LazyLock::new(|| {
    let mut commands: HashMap<&'static str, Box<dyn Command>> = HashMap::new();
    commands.insert("set", Box::new(set::SetCommand));
    commands.insert("comment", Box::new(comment::CommentCommand));
    commands
});

/// Handle a PRIVMSG. Non-commands are ignored.
pub async fn dispatch(
    ctx: &Context,
    conn: &Connection,
    source: &Prefix,
    target: &str,
    text: &str,
) -> Result<(), ClientError> {
    let Some(nick) = source.nick() else {
        return Ok(());
    };
    let (is_channel, from_me) = conn.with_state(|s| (s.is_channel(target), s.is_me(nick)));
    if from_me {
        return Ok(());
    }
    let channel = is_channel.then_some(target);

    let trigger = match channel {
        Some(channel) => ctx.policy(&conn.casefold(channel)).await.trigger,
        None => ctx.bot.trigger.clone(),
    };
    let Some(rest) = text.strip_prefix(trigger.as_str()) else {
        return Ok(());
    };
    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let Some(command) = COMMANDS.get(name.to_ascii_lowercase().as_str()) else {
        return Ok(());
    };

    debug!(nick = %nick, command = %name, target = %target, "Command");
    let req = Request {
        ctx,
        conn,
        source,
        nick,
        channel,
        args: args.trim(),
    };
    let reply = match command.run(&req).await {
        Ok(ack) => ack,
        Err(e) => {
            if e.is_internal() {
                warn!(nick = %nick, command = %name, error = ?e, "Command failed");
            }
            e.to_string()
        }
    };
    conn.send(Message::notice(nick, reply))
}
