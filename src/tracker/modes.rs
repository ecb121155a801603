//! Live ban/quiet changes.
//!
//! Every tracked change first closes any active record for its target. Adds
//! then open a new record, notify the setter and queue the mask for
//! enforcement, which runs once after the whole MODE line is stored.

use bantracker_proto::{Message, ModeChange, Prefix};
use tracing::{debug, info};

use super::enforce::{self, Pending};
use super::{Context, now};
use crate::client::Connection;
use crate::db::RestrictionKind;
use crate::error::{ClientError, EnforceError};
use crate::mask::{Mask, fold_mask};

/// Add notification sent to the setter.
pub fn added_notice(kind: RestrictionKind, id: i64, channel: &str) -> String {
    format!("{kind} {id} added for {channel}")
}

/// Store the tracked changes of one MODE line on `channel`, then enforce
/// any additions if the channel's policy says so. Returns the new ids.
pub async fn process(
    ctx: &Context,
    conn: &Connection,
    channel: &str,
    source: Option<&Prefix>,
    changes: &[ModeChange],
) -> Result<Vec<i64>, EnforceError> {
    let (folded_channel, display_name, casemap, extban_prefix) = conn.with_state(|s| {
        (
            s.casefold(channel),
            s.channel(channel)
                .map_or_else(|| channel.to_string(), |c| c.name.clone()),
            s.isupport.casemapping,
            s.isupport.extban.prefix,
        )
    });
    let set_by = source.map(ToString::to_string).unwrap_or_default();
    let repo = ctx.db.restrictions();
    let at = now();

    let mut added = Vec::new();
    let mut pending = Vec::new();

    for change in changes {
        let Some(kind) = ctx.kind_for_mode(change.mode) else {
            continue;
        };
        let Some(arg) = &change.arg else { continue };
        let mask = fold_mask(arg, casemap, extban_prefix);

        if repo
            .mark_removed_target(&folded_channel, kind, &mask, Some(&set_by), at)
            .await?
        {
            debug!(channel = %folded_channel, %kind, mask = %mask, "Closed");
        }

        if change.add {
            let id = repo.add(&folded_channel, kind, &mask, &set_by, at).await?;
            info!(channel = %folded_channel, id, %kind, mask = %mask, set_by = %set_by, "Tracked");

            if let Some(nick) = source.and_then(Prefix::nick) {
                notify(conn, nick, &added_notice(kind, id, &display_name))?;
            }
            pending.push(Pending {
                id,
                kind,
                mask: Mask::compile(&mask, casemap, extban_prefix),
            });
            added.push(id);
        }
    }

    if !pending.is_empty() && ctx.policy(&folded_channel).await.enforce {
        enforce::enforce(ctx, conn, channel, &pending).await?;
    }
    Ok(added)
}

fn notify(conn: &Connection, nick: &str, text: &str) -> Result<(), ClientError> {
    conn.send(Message::notice(nick, text))
}
