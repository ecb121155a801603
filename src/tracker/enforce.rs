//! Enforcement of new restrictions and batched list removals.
//!
//! Planning is pure: [`plan`] decides who to kick and who to devoice from a
//! state snapshot. Execution acquires ops through ChanServ when allowed,
//! kicks one member per line, then sends the remaining mode changes in
//! batches no larger than the network's `MODES` limit, releasing ops in the
//! last batch if we requested them.

use bantracker_proto::{Casemapping, Message};
use tracing::{debug, info};

use super::Context;
use crate::client::{Connection, NetworkState};
use crate::db::RestrictionKind;
use crate::error::{ClientError, EnforceError};
use crate::mask::{Candidates, Mask};

/// A restriction just added and waiting to be enforced.
#[derive(Debug, Clone)]
pub struct Pending {
    pub id: i64,
    pub kind: RestrictionKind,
    pub mask: Mask,
}

/// Actions decided for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// (nick, restriction id)
    pub kicks: Vec<(String, i64)>,
    pub devoices: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.kicks.is_empty() && self.devoices.is_empty()
    }
}

/// Kick reason naming the restriction.
pub fn kick_reason(id: i64) -> String {
    format!("User is banned from this channel ({id})")
}

/// Members of `channel` (other than us) affected by `pending`.
///
/// A ban applies to members without any status mode; a quiet applies to
/// members whose only status is voice. Each member is acted on at most once
/// per kind.
pub fn plan(state: &NetworkState, channel: &str, pending: &[Pending], templates: &[String]) -> Plan {
    let mut plan = Plan::default();
    let Some(chan) = state.channel(channel) else {
        return plan;
    };
    let casemap = state.isupport.casemapping;
    let extban_prefix = state.isupport.extban.prefix;

    let mut members: Vec<_> = chan.members.iter().collect();
    members.sort_by(|a, b| a.0.cmp(b.0));

    for (folded_nick, modes) in members {
        if state.is_me(folded_nick) {
            continue;
        }
        let kickable = modes.is_empty();
        let devoiceable = modes.is_voice_only();
        if !kickable && !devoiceable {
            continue;
        }
        let Some(user) = state.user(folded_nick) else {
            continue;
        };
        let candidates = Candidates::build(&user.identity(), casemap, extban_prefix, templates);

        let mut kicked = false;
        let mut devoiced = false;
        for p in pending {
            if !p.mask.matches_user(&candidates) {
                continue;
            }
            match p.kind {
                RestrictionKind::Ban if kickable && !kicked => {
                    plan.kicks.push((user.nick.clone(), p.id));
                    kicked = true;
                }
                RestrictionKind::Quiet if devoiceable && !devoiced => {
                    plan.devoices.push(user.nick.clone());
                    devoiced = true;
                }
                _ => {}
            }
        }
    }
    plan
}

/// Split `changes` into MODE lines of at most `limit` changes each.
pub fn mode_batches(
    channel: &str,
    add: bool,
    changes: &[(char, String)],
    limit: usize,
) -> Vec<Message> {
    let sign = if add { '+' } else { '-' };
    changes
        .chunks(limit.max(1))
        .map(|chunk| {
            let mut modes = String::with_capacity(chunk.len() + 1);
            modes.push(sign);
            modes.extend(chunk.iter().map(|(m, _)| *m));
            Message::mode(channel, modes, chunk.iter().map(|(_, a)| a.clone()))
        })
        .collect()
}

/// Make sure we hold ops in `channel`. Returns `true` if we had to ask for
/// them (and so should give them back).
pub async fn assure_op(
    ctx: &Context,
    conn: &Connection,
    channel: &str,
    chanserv: bool,
) -> Result<bool, EnforceError> {
    if conn.with_state(|s| s.is_opped(channel)) {
        return Ok(false);
    }
    if !chanserv {
        return Err(EnforceError::NotOpped(channel.to_string()));
    }

    let casemap: Casemapping = conn.with_state(|s| s.isupport.casemapping);
    let folded = casemap.fold(channel);
    let mut sub = conn.subscribe(move |m| {
        m.command == "MODE" && m.param(0).is_some_and(|c| casemap.fold(c) == folded)
    });
    conn.send(Message::privmsg(
        ctx.bot.chanserv_nick.as_str(),
        format!("OP {channel}"),
    ))?;

    let timeout = ctx.bot.op_timeout();
    let waited = tokio::time::timeout(timeout, async {
        loop {
            sub.wait(None).await?;
            if conn.with_state(|s| s.is_opped(channel)) {
                return Ok::<_, ClientError>(());
            }
        }
    })
    .await;

    match waited {
        Ok(result) => {
            result?;
            debug!(channel = %channel, "Opped by services");
            Ok(true)
        }
        Err(_) => Err(EnforceError::OpTimeout(channel.to_string())),
    }
}

/// Send `-changes` (plus our own `-o` when `release_op`) in batches.
pub fn remove_modes(
    conn: &Connection,
    channel: &str,
    mut changes: Vec<(char, String)>,
    release_op: bool,
) -> Result<(), ClientError> {
    let (nick, limit) = conn.with_state(|s| (s.nickname.clone(), s.isupport.modes));
    if release_op {
        changes.push(('o', nick));
    }
    for msg in mode_batches(channel, false, &changes, limit) {
        conn.send(msg)?;
    }
    Ok(())
}

/// Kick and devoice members affected by `pending` in `channel`.
pub async fn enforce(
    ctx: &Context,
    conn: &Connection,
    channel: &str,
    pending: &[Pending],
) -> Result<Plan, EnforceError> {
    let plan = conn.with_state(|s| plan(s, channel, pending, &ctx.bot.extbans));
    if plan.is_empty() {
        return Ok(plan);
    }

    let folded = conn.casefold(channel);
    let policy = ctx.policy(&folded).await;
    let release = assure_op(ctx, conn, channel, policy.chanserv).await?;

    for (nick, id) in &plan.kicks {
        conn.send(Message::kick(channel, nick.as_str(), kick_reason(*id)))?;
    }
    let devoices = plan.devoices.iter().map(|n| ('v', n.clone())).collect();
    remove_modes(conn, channel, devoices, release)?;

    info!(
        channel = %channel,
        kicks = plan.kicks.len(),
        devoices = plan.devoices.len(),
        "Enforced"
    );
    Ok(plan)
}

/// Lift the given restrictions from `channel`. Quiets are skipped when the
/// network has no quiet mode configured.
pub async fn remove_restrictions(
    ctx: &Context,
    conn: &Connection,
    channel: &str,
    restrictions: &[(RestrictionKind, String)],
) -> Result<usize, EnforceError> {
    let changes: Vec<(char, String)> = restrictions
        .iter()
        .filter_map(|(kind, mask)| Some((ctx.mode_for_kind(*kind)?, mask.clone())))
        .collect();
    if changes.is_empty() {
        return Ok(0);
    }

    let folded = conn.casefold(channel);
    let policy = ctx.policy(&folded).await;
    let release = assure_op(ctx, conn, channel, policy.chanserv).await?;
    let count = changes.len();
    remove_modes(conn, channel, changes, release)?;
    Ok(count)
}
