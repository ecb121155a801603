use async_trait::async_trait;
use tracing::info;

use super::{Command, Request, parse_duration};
use crate::db::Restriction;
use crate::error::CommandError;
use crate::tracker::now;

/// `comment <id|^> [+<duration>] [<reason>]`: annotate a restriction with a
/// reason, an expiry, or both.
pub struct CommentCommand;

#[async_trait]
impl Command for CommentCommand {
    async fn run(&self, req: &Request<'_>) -> Result<String, CommandError> {
        let repo = req.ctx.db.restrictions();
        let (target, rest) = req.args.split_once(' ').unwrap_or((req.args, ""));

        let id = if target == "^" {
            let channel = req.channel.ok_or(CommandError::NotInChannel)?;
            repo.last_active_id(&req.conn.casefold(channel))
                .await?
                .ok_or(CommandError::NoLastRestriction)?
        } else if !target.is_empty() && target.bytes().all(|b| b.is_ascii_digit()) {
            target
                .parse()
                .map_err(|_| CommandError::InvalidId(target.to_string()))?
        } else {
            return Err(CommandError::InvalidId(target.to_string()));
        };
        let restriction = repo.get(id).await?;

        if !authorized(req, &restriction) {
            return Err(CommandError::PermissionDenied);
        }

        let rest = rest.trim();
        if rest.is_empty() {
            return Err(CommandError::MissingDurationOrReason);
        }
        let (duration, reason) = match rest.strip_prefix('+') {
            Some(after) => {
                let (token, reason) = after.split_once(' ').unwrap_or((after, ""));
                let seconds = parse_duration(token)
                    .ok_or_else(|| CommandError::InvalidDuration(token.to_string()))?;
                (Some(seconds), reason.trim())
            }
            None => (None, rest),
        };

        let set_by = req.source.to_string();
        let at = now();
        let mut updated = Vec::new();
        if !reason.is_empty() {
            repo.append_reason(id, &set_by, at, reason).await?;
            updated.push("reason");
        }
        if let Some(seconds) = duration {
            let expires_at = repo.append_expiration(id, &set_by, at, seconds).await?;
            info!(id, expires_at, set_by = %set_by, "Expiry set");
            updated.push("duration");
        }

        Ok(format!(
            "Set {} for {} {} ({})",
            updated.join(" and "),
            restriction.kind.to_string().to_lowercase(),
            id,
            restriction.mask
        ))
    }
}

/// The original setter, or anyone currently holding `o` in the
/// restriction's channel.
///
/// A setter recorded with a full `nick!user@host` must match the issuer's
/// full prefix. Only setters recorded as a bare nick (from list replies of
/// servers that omit the host) are matched by nick.
fn authorized(req: &Request<'_>, restriction: &Restriction) -> bool {
    req.conn.with_state(|s| {
        let set_by = s.casefold(&restriction.set_by);
        let is_setter = if set_by.contains(['!', '@']) {
            set_by == s.casefold(&req.source.to_string())
        } else {
            set_by == s.casefold(req.nick)
        };
        is_setter
            || s.member_modes(&restriction.channel, req.nick)
                .is_some_and(|m| m.is_op())
    })
}

#[cfg(test)]
mod tests {
    use crate::db::RestrictionKind;
    use crate::tracker::commands::dispatch;
    use crate::tracker::now;
    use crate::tracker::testing::{bot, harness};
    use bantracker_proto::Prefix;

    #[tokio::test]
    async fn test_comment_reason_and_duration() {
        let mut h = harness(bot()).await;
        h.server.join("#chan", "@bt @Op!o@op.host").await;
        let op = Prefix::new("Op", "o", "op.host");
        let set_at = now() - 100;
        let id = h
            .ctx
            .db
            .restrictions()
            .add("#chan", RestrictionKind::Ban, "*!*@spam.host", "someone", set_at)
            .await
            .unwrap();

        let (ctx, conn, server) = h.split();
        let text = format!("!comment {id} +1h spamming links");
        dispatch(ctx, conn, &op, "#chan", &text).await.unwrap();
        assert_eq!(
            server.expect().await,
            format!("NOTICE Op :Set reason and duration for ban {id} (*!*@spam.host)")
        );

        let repo = ctx.db.restrictions();
        let restriction = repo.get(id).await.unwrap();
        assert_eq!(restriction.reason.as_deref(), Some("spamming links"));
        assert_eq!(restriction.expires_at, Some(set_at + 3_600));
        assert_eq!(repo.reasons(id).await.unwrap()[0].set_by, "Op!o@op.host");

        dispatch(ctx, conn, &op, "#chan", &format!("!comment {id} +2h"))
            .await
            .unwrap();
        assert_eq!(
            server.expect().await,
            format!("NOTICE Op :Set duration for ban {id} (*!*@spam.host)")
        );
        assert_eq!(repo.expirations(id).await.unwrap().len(), 2);
        assert_eq!(repo.get(id).await.unwrap().expires_at, Some(set_at + 7_200));
        server.settle().await;
    }

    #[tokio::test]
    async fn test_comment_last_and_setter() {
        let mut h = harness(bot()).await;
        h.server.join("#chan", "@bt Setter!s@s.host").await;
        let setter = Prefix::new("Setter", "s", "s.host");
        let repo = h.ctx.db.restrictions();
        repo.add("#chan", RestrictionKind::Ban, "a!*@*", "Op!o@op.host", 1)
            .await
            .unwrap();
        let last = repo
            .add("#chan", RestrictionKind::Quiet, "b!*@*", "SETTER!s@s.host", 2)
            .await
            .unwrap();

        let (ctx, conn, server) = h.split();
        dispatch(ctx, conn, &setter, "#chan", "!comment ^ flooding")
            .await
            .unwrap();
        assert_eq!(
            server.expect().await,
            format!("NOTICE Setter :Set reason for quiet {last} (b!*@*)")
        );

        dispatch(ctx, conn, &setter, "#chan", "!comment 1 not mine")
            .await
            .unwrap();
        assert_eq!(
            server.expect().await,
            "NOTICE Setter :You do not have permission to do this"
        );
        assert_eq!(ctx.db.restrictions().get(1).await.unwrap().reason, None);
        server.settle().await;
    }

    #[tokio::test]
    async fn test_comment_setter_nick_alone_is_not_enough() {
        let mut h = harness(bot()).await;
        h.server.join("#chan", "@bt Op!evil@evil.host").await;
        let impostor = Prefix::new("Op", "evil", "evil.host");
        let id = h
            .ctx
            .db
            .restrictions()
            .add("#chan", RestrictionKind::Ban, "*!*@x", "Op!o@op.host", 1)
            .await
            .unwrap();

        let (ctx, conn, server) = h.split();
        let text = format!("!comment {id} +1s hijacked");
        dispatch(ctx, conn, &impostor, "#chan", &text).await.unwrap();
        assert_eq!(
            server.expect().await,
            "NOTICE Op :You do not have permission to do this"
        );

        let repo = ctx.db.restrictions();
        assert!(repo.reasons(id).await.unwrap().is_empty());
        assert!(repo.expirations(id).await.unwrap().is_empty());
        server.settle().await;
    }

    #[tokio::test]
    async fn test_comment_bare_nick_setter() {
        let mut h = harness(bot()).await;
        h.server.join("#chan", "@bt Op!any@where.host").await;
        let setter = Prefix::new("Op", "any", "where.host");
        let id = h
            .ctx
            .db
            .restrictions()
            .add("#chan", RestrictionKind::Ban, "*!*@x", "OP", 1)
            .await
            .unwrap();

        let (ctx, conn, server) = h.split();
        dispatch(ctx, conn, &setter, "#chan", &format!("!comment {id} listed"))
            .await
            .unwrap();
        assert_eq!(
            server.expect().await,
            format!("NOTICE Op :Set reason for ban {id} (*!*@x)")
        );
        server.settle().await;
    }

    #[tokio::test]
    async fn test_comment_errors_mutate_nothing() {
        let mut h = harness(bot()).await;
        h.server.join("#chan", "@bt @Op!o@op.host").await;
        let op = Prefix::new("Op", "o", "op.host");
        let id = h
            .ctx
            .db
            .restrictions()
            .add("#chan", RestrictionKind::Ban, "a!*@*", "x", 1)
            .await
            .unwrap();

        let (ctx, conn, server) = h.split();
        let cases = [
            ("!comment abc reason".to_string(), "Please provide a numeric ban id".to_string()),
            ("!comment 999 reason".to_string(), "Ban 999 does not exist".to_string()),
            (
                format!("!comment {id}"),
                "Please provide a duration, a reason or both".to_string(),
            ),
            (
                format!("!comment {id} +3x reason"),
                "Invalid duration '3x'".to_string(),
            ),
            (format!("!comment {id} +0h"), "Invalid duration '0h'".to_string()),
        ];
        for (text, reply) in cases {
            dispatch(ctx, conn, &op, "#chan", &text).await.unwrap();
            assert_eq!(server.expect().await, format!("NOTICE Op :{reply}"));
        }

        let repo = ctx.db.restrictions();
        assert!(repo.reasons(id).await.unwrap().is_empty());
        assert!(repo.expirations(id).await.unwrap().is_empty());
        server.settle().await;
    }

    #[tokio::test]
    async fn test_comment_last_needs_channel() {
        let mut h = harness(bot()).await;
        let op = Prefix::new("Op", "o", "op.host");

        let (ctx, conn, server) = h.split();
        dispatch(ctx, conn, &op, "bt", "!comment ^ reason")
            .await
            .unwrap();
        assert_eq!(
            server.expect().await,
            "NOTICE Op :This command must be used in a channel"
        );
        dispatch(ctx, conn, &op, "#chan", "!comment ^ reason")
            .await
            .unwrap();
        assert_eq!(
            server.expect().await,
            "NOTICE Op :There is no active ban or quiet in this channel"
        );
        server.settle().await;
    }
}
