//! bantracker - IRC channel ban and quiet tracker.
//!
//! One supervised connection per configured network. Each connection keeps a
//! local view of the network (channels, members, identities), records every
//! ban and quiet into a SQLite history, reconciles that history against the
//! server's lists on join, and optionally enforces and expires restrictions.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod mask;
pub mod tracker;

use std::time::Duration;

use rand::Rng;
use tracing::{Instrument, error, info, info_span, warn};

use crate::client::{Connection, connect};
use crate::config::NetworkConfig;
use crate::tracker::{Context, Tracker};

/// Keep one network connected until the task is dropped.
pub async fn run_network(ctx: Context, config: NetworkConfig) {
    let span = info_span!("network", name = %config.name);
    async move {
        loop {
            match connect(&config).await {
                Ok(stream) => {
                    info!(host = %config.host, port = config.port, tls = stream.is_tls(), "Connected");
                    let (conn, events) = Connection::start(&config, stream);
                    let tracker = Tracker::new(ctx.clone(), conn, config.channels.clone());
                    match tracker.run(events).await {
                        Ok(()) => warn!("Connection closed"),
                        Err(e) => error!(error = %e, "Connection failed"),
                    }
                }
                Err(e) => error!(host = %config.host, error = %e, "Connect failed"),
            }

            let delay = reconnect_delay(config.reconnect_delay_secs);
            info!(delay_secs = delay.as_secs(), "Reconnecting");
            tokio::time::sleep(delay).await;
        }
    }
    .instrument(span)
    .await
}

/// Base delay plus up to half of it again as jitter.
fn reconnect_delay(base_secs: u64) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=base_secs / 2);
    Duration::from_secs(base_secs + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay_bounds() {
        for _ in 0..100 {
            let d = reconnect_delay(10).as_secs();
            assert!((10..=15).contains(&d));
        }
        assert_eq!(reconnect_delay(0), Duration::ZERO);
    }
}
