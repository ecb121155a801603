use async_trait::async_trait;

use super::{Command, Request};
use crate::error::CommandError;

/// `set <key> <value>`: change a per-channel setting. Channel operators only.
pub struct SetCommand;

#[async_trait]
impl Command for SetCommand {
    async fn run(&self, req: &Request<'_>) -> Result<String, CommandError> {
        let channel = req.channel.ok_or(CommandError::NotInChannel)?;
        let (folded, name, is_op) = req.conn.with_state(|s| {
            let name = s.channel(channel).map(|c| c.name.clone());
            let is_op = s
                .member_modes(channel, req.nick)
                .is_some_and(|m| m.is_op());
            (s.casefold(channel), name, is_op)
        });
        let name = name.ok_or(CommandError::NotInChannel)?;
        if !is_op {
            return Err(CommandError::PermissionDenied);
        }

        let (key, value) = req
            .args
            .split_once(char::is_whitespace)
            .map(|(k, v)| (k, v.trim()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .ok_or(CommandError::MissingKeyValue)?;

        let applied = req.ctx.channels.apply(&folded, key, value).await?;
        Ok(format!("Set {} '{}' for {}", applied.key(), applied, name))
    }
}
