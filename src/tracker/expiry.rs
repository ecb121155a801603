//! Timed removal of expired restrictions.
//!
//! A timer aligned to the start of each minute sends a `PING` carrying
//! [`EXPIRE_TOKEN`]; the check runs when the matching `PONG` comes back, so
//! it is serialized with every other event on the connection.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::enforce::remove_restrictions;
use super::{Context, now};
use crate::client::Connection;
use crate::db::RestrictionKind;

pub const EXPIRE_TOKEN: &str = "expirecheck";

const PERIOD: Duration = Duration::from_secs(60);

/// Time left until the next minute boundary after `at`.
pub fn until_next_minute(at: DateTime<Utc>) -> Duration {
    Duration::from_secs(u64::from(60 - at.second().min(59)))
}

/// Ticks at the start of every minute.
pub fn timer() -> Interval {
    let start = Instant::now() + until_next_minute(Utc::now());
    let mut interval = tokio::time::interval_at(start, PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Lift every restriction whose expiry has passed, grouped per channel.
/// Channels we are not in are left for a later check.
pub async fn check(ctx: &Context, conn: &Connection) {
    let expired = match ctx.db.restrictions().expired_before(now()).await {
        Ok(expired) => expired,
        Err(e) => {
            warn!(error = %e, "Failed to query expired restrictions");
            return;
        }
    };

    let mut by_channel: BTreeMap<String, Vec<(RestrictionKind, String)>> = BTreeMap::new();
    for restriction in expired {
        by_channel
            .entry(restriction.channel)
            .or_default()
            .push((restriction.kind, restriction.mask));
    }

    for (channel, restrictions) in by_channel {
        let Some(name) = conn.with_state(|s| s.channel(&channel).map(|c| c.name.clone())) else {
            debug!(channel = %channel, "Not joined, skipping expiries");
            continue;
        };
        match remove_restrictions(ctx, conn, &name, &restrictions).await {
            Ok(count) => debug!(channel = %name, count, "Expired restrictions lifted"),
            Err(e) => {
                warn!(channel = %name, error = %e, code = e.error_code(), "Failed to lift expired restrictions")
            }
        }
    }
}
