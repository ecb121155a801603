//! Restriction tracking for one network connection.
//!
//! [`Tracker::run`] consumes the connection's ordered event stream and
//! dispatches each event to the synchronizer, the mode processor, the
//! command interface or the expiry check. Events are handled one at a time,
//! so store mutations for a channel are never interleaved.

pub mod commands;
pub mod enforce;
pub mod expiry;
pub mod modes;
pub mod sync;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use bantracker_proto::Message;
use tracing::{debug, info, warn};

use crate::client::{Connection, Event, Events, WHOX_FIELDS, WHOX_TOKEN};
use crate::config::{BotConfig, ChannelConfigProvider, EffectivePolicy};
use crate::db::{Database, RestrictionKind};
use crate::error::ClientError;

/// Channels per JOIN line on connect.
const JOIN_GROUP: usize = 10;

/// Shared services passed down to every handler.
#[derive(Clone)]
pub struct Context {
    pub db: Database,
    pub channels: Arc<dyn ChannelConfigProvider>,
    pub bot: Arc<BotConfig>,
}

impl Context {
    pub fn new(db: Database, channels: Arc<dyn ChannelConfigProvider>, bot: BotConfig) -> Self {
        Self {
            db,
            channels,
            bot: Arc::new(bot),
        }
    }

    /// Effective settings for an already-folded channel name. A channel
    /// config that fails to load falls back to the global defaults.
    pub async fn policy(&self, channel: &str) -> EffectivePolicy {
        match self.channels.get(channel).await {
            Ok(config) => config.effective(&self.bot),
            Err(e) => {
                warn!(channel = %channel, error = %e, "Using global defaults");
                crate::config::ChannelConfig::default().effective(&self.bot)
            }
        }
    }

    /// Which restriction kind a list mode letter tracks, if any.
    pub fn kind_for_mode(&self, mode: char) -> Option<RestrictionKind> {
        if mode == 'b' {
            Some(RestrictionKind::Ban)
        } else if self.bot.quiet == Some(mode) {
            Some(RestrictionKind::Quiet)
        } else {
            None
        }
    }

    /// The list mode letter for `kind` on this network, if tracked.
    pub fn mode_for_kind(&self, kind: RestrictionKind) -> Option<char> {
        match kind {
            RestrictionKind::Ban => Some('b'),
            RestrictionKind::Quiet => self.bot.quiet,
        }
    }
}

/// Current UNIX time in seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Event loop for one connection.
pub struct Tracker {
    ctx: Context,
    conn: Connection,
    autojoin: Vec<String>,
}

impl Tracker {
    pub fn new(ctx: Context, conn: Connection, autojoin: Vec<String>) -> Self {
        Self {
            ctx,
            conn,
            autojoin,
        }
    }

    /// Handle events until the connection closes.
    pub async fn run(self, mut events: Events) -> Result<(), ClientError> {
        let mut timer = expiry::timer();
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await?,
                    None => break,
                },
                _ = timer.tick() => {
                    if self.conn.with_state(|s| s.registered) {
                        self.conn.send(Message::ping(expiry::EXPIRE_TOKEN))?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle(&self, event: Event) -> Result<(), ClientError> {
        match event {
            Event::Registered => {
                info!(nick = %self.conn.with_state(|s| s.nickname.clone()), "Registered");
                for group in self.autojoin.chunks(JOIN_GROUP) {
                    self.conn.send(Message::join(group.join(",")))?;
                }
            }
            Event::Joined { channel } => {
                info!(channel = %channel, "Joined");
                self.conn
                    .send(Message::whox(channel.as_str(), WHOX_FIELDS, WHOX_TOKEN))?;
                match sync::synchronize(&self.ctx, &self.conn, &channel).await {
                    Ok(report) => info!(
                        channel = %channel,
                        added = report.added,
                        removed = report.removed,
                        "Synchronized"
                    ),
                    Err(e) => warn!(channel = %channel, error = %e, "Synchronization failed"),
                }
            }
            Event::Mode {
                channel,
                source,
                changes,
            } => {
                if let Err(e) =
                    modes::process(&self.ctx, &self.conn, &channel, source.as_ref(), &changes).await
                {
                    warn!(channel = %channel, error = %e, code = e.error_code(), "Mode processing failed");
                }
            }
            Event::Message {
                source,
                target,
                text,
            } => {
                commands::dispatch(&self.ctx, &self.conn, &source, &target, &text).await?;
            }
            Event::Pong { token } if token == expiry::EXPIRE_TOKEN => {
                debug!("Checking expiries");
                expiry::check(&self.ctx, &self.conn).await;
            }
            Event::Pong { .. } => {}
        }
        Ok(())
    }
}
