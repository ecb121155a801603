//! Join-time reconciliation of the store against the server's lists.
//!
//! Restrictions that disappeared while we were away are closed with an
//! unknown remover; ones that appeared are recorded with the setter and time
//! the server reports. Nothing found here is enforced.

use std::collections::HashSet;

use bantracker_proto::{Message, Response};
use tracing::debug;

use super::{Context, now};
use crate::client::Connection;
use crate::db::{Database, DbError, RestrictionKind};
use crate::error::{ClientError, EnforceError};
use crate::mask::fold_mask;

/// One entry of a ban or quiet list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub kind: RestrictionKind,
    /// Folded mask.
    pub mask: String,
    pub set_by: String,
    pub set_at: i64,
}

/// What a reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
}

/// Query the ban list (and quiet list, when tracked) of `channel` and
/// collect entries until every queried list has ended.
pub async fn fetch_list(
    ctx: &Context,
    conn: &Connection,
    channel: &str,
) -> Result<Vec<ListEntry>, ClientError> {
    let modes = ctx.bot.list_modes();
    let (casemap, extban_prefix) =
        conn.with_state(|s| (s.isupport.casemapping, s.isupport.extban.prefix));
    let folded = casemap.fold(channel);

    let mut sub = conn.subscribe(move |m| {
        matches!(
            m.response(),
            Some(
                Response::RPL_BANLIST
                    | Response::RPL_ENDOFBANLIST
                    | Response::RPL_QUIETLIST
                    | Response::RPL_ENDOFQUIETLIST
            )
        ) && m.param(1).is_some_and(|c| casemap.fold(c) == folded)
    });
    conn.send(Message::mode(channel, format!("+{modes}"), std::iter::empty()))?;

    let mut waiting = modes.chars().count();
    let mut entries = Vec::new();
    while waiting > 0 {
        let msg = sub.wait(None).await?;
        // 367 <me> <chan> <mask> [<setter> <set-at>]
        // 728 <me> <chan> <letter> <mask> [<setter> <set-at>]
        let (kind, offset) = match msg.response() {
            Some(Response::RPL_BANLIST) => (RestrictionKind::Ban, 0),
            Some(Response::RPL_QUIETLIST) => (RestrictionKind::Quiet, 1),
            _ => {
                waiting -= 1;
                continue;
            }
        };
        let Some(mask) = msg.param(offset + 2) else {
            continue;
        };
        entries.push(ListEntry {
            kind,
            mask: fold_mask(mask, casemap, extban_prefix),
            set_by: msg.param(offset + 3).unwrap_or_default().to_string(),
            set_at: msg
                .param(offset + 4)
                .and_then(|t| t.parse().ok())
                .unwrap_or_else(now),
        });
    }

    debug!(channel = %channel, entries = entries.len(), "List received");
    Ok(entries)
}

/// Make the active set of `channel` equal `live`. Running it twice with the
/// same `live` changes nothing the second time.
pub async fn reconcile(
    db: &Database,
    channel: &str,
    live: &[ListEntry],
    removed_at: i64,
) -> Result<SyncReport, DbError> {
    let repo = db.restrictions();
    let active = repo.active_restrictions(channel).await?;

    let live_keys: HashSet<(RestrictionKind, &str)> =
        live.iter().map(|e| (e.kind, e.mask.as_str())).collect();
    let mut tracked: HashSet<(RestrictionKind, &str)> =
        active.iter().map(|a| (a.kind, a.mask.as_str())).collect();

    let mut report = SyncReport::default();

    for restriction in &active {
        if !live_keys.contains(&(restriction.kind, restriction.mask.as_str()))
            && repo.mark_removed(restriction.id, None, removed_at).await?
        {
            debug!(channel = %channel, id = restriction.id, mask = %restriction.mask, "Removed while away");
            report.removed += 1;
        }
    }

    for entry in live {
        if tracked.insert((entry.kind, entry.mask.as_str())) {
            let id = repo
                .add(channel, entry.kind, &entry.mask, &entry.set_by, entry.set_at)
                .await?;
            debug!(channel = %channel, id, mask = %entry.mask, "Added while away");
            report.added += 1;
        }
    }

    Ok(report)
}

/// Fetch the live lists for `channel` and reconcile the store with them.
pub async fn synchronize(
    ctx: &Context,
    conn: &Connection,
    channel: &str,
) -> Result<SyncReport, EnforceError> {
    let live = fetch_list(ctx, conn, channel).await?;
    let folded = conn.casefold(channel);
    Ok(reconcile(&ctx.db, &folded, &live, now()).await?)
}
