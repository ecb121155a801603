//! IRC client connection.
//!
//! A [`Connection`] owns two tasks over one framed stream:
//!
//! - the reader applies every inbound line to [`NetworkState`], answers
//!   PINGs, drives registration, hands the line to any matching
//!   [`Subscription`], then emits an [`Event`] in arrival order;
//! - the writer drains the outgoing queue through a token bucket.
//!
//! Callers that need a reply register a [`Subscription`] *before* sending
//! the request, so the reply can never race past them.

pub mod event;
pub mod handshake;
pub mod state;
pub mod transport;

pub use event::Event;
pub use handshake::Registration;
pub use state::{ChannelState, MemberModes, NetworkState, UserState, WHOX_FIELDS, WHOX_TOKEN};
pub use transport::{IrcStream, connect};

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bantracker_proto::{IrcCodec, Message};
use futures_util::{SinkExt, StreamExt};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

use crate::config::NetworkConfig;
use crate::error::ClientError;

type Filter = Box<dyn Fn(&Message) -> bool + Send + Sync>;

struct Waiter {
    id: u64,
    filter: Filter,
    tx: mpsc::UnboundedSender<Message>,
}

struct Inner {
    name: String,
    state: RwLock<NetworkState>,
    outgoing: mpsc::UnboundedSender<Message>,
    waiters: Mutex<Vec<Waiter>>,
    next_waiter: AtomicU64,
}

/// Handle to a running connection. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// Ordered stream of events from one connection. Ends when the connection
/// closes.
pub type Events = mpsc::UnboundedReceiver<Event>;

/// Outgoing flood control from a network block.
pub fn send_quota(config: &NetworkConfig) -> Quota {
    let rate = NonZeroU32::new(config.send_rate_per_second).unwrap_or(nonzero!(2u32));
    let burst = NonZeroU32::new(config.send_burst).unwrap_or(nonzero!(5u32));
    Quota::per_second(rate).allow_burst(burst)
}

impl Connection {
    /// Spawn the reader and writer tasks over `stream` and begin registration.
    pub fn start<S>(config: &NetworkConfig, stream: S) -> (Connection, Events)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            name: config.name.clone(),
            state: RwLock::new(NetworkState::new(&config.nick)),
            outgoing: out_tx,
            waiters: Mutex::new(Vec::new()),
            next_waiter: AtomicU64::new(0),
        });
        let conn = Connection { inner };

        let (sink, stream) = Framed::new(stream, IrcCodec::new()).split();

        let mut registration = Registration::new(config);
        for msg in registration.start() {
            // Queue is fresh and the receiver is alive.
            let _ = conn.inner.outgoing.send(msg);
        }

        tokio::spawn(write_loop(sink, out_rx, send_quota(config)));
        tokio::spawn(read_loop(conn.clone(), stream, registration, event_tx));

        (conn, event_rx)
    }

    /// Network label from the config.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queue a message for sending.
    pub fn send(&self, msg: Message) -> Result<(), ClientError> {
        self.inner.outgoing.send(msg).map_err(|_| ClientError::Closed)
    }

    /// Deliver every inbound message matching `filter` to the returned
    /// subscription until it is dropped.
    pub fn subscribe<F>(&self, filter: F) -> Subscription
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_waiter.fetch_add(1, Ordering::Relaxed);
        self.inner.waiters.lock().push(Waiter {
            id,
            filter: Box::new(filter),
            tx,
        });
        Subscription {
            id,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Run `f` against the current state. Do not hold on to anything
    /// borrowed from it across an await.
    pub fn with_state<R>(&self, f: impl FnOnce(&NetworkState) -> R) -> R {
        f(&self.inner.state.read())
    }

    /// Fold `s` with the network's case-mapping.
    pub fn casefold(&self, s: &str) -> String {
        self.with_state(|state| state.casefold(s))
    }

    fn dispatch(&self, msg: &Message) {
        let mut waiters = self.inner.waiters.lock();
        waiters.retain(|w| {
            if (w.filter)(msg) {
                w.tx.send(msg.clone()).is_ok()
            } else {
                !w.tx.is_closed()
            }
        });
    }
}

/// Inbound messages matching a filter registered with
/// [`Connection::subscribe`].
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Message>,
    inner: Arc<Inner>,
}

impl Subscription {
    /// Next matching message, optionally bounded by `timeout`.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<Message, ClientError> {
        let next = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.rx.recv())
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => self.rx.recv().await,
        };
        next.ok_or(ClientError::Closed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.waiters.lock().retain(|w| w.id != self.id);
    }
}

async fn write_loop<W>(mut sink: W, mut rx: mpsc::UnboundedReceiver<Message>, quota: Quota)
where
    W: futures_util::Sink<Message, Error = bantracker_proto::ProtocolError> + Unpin,
{
    let limiter = RateLimiter::direct(quota);
    while let Some(msg) = rx.recv().await {
        limiter.until_ready().await;
        trace!("> {}", msg);
        if let Err(e) = sink.send(msg).await {
            warn!(error = %e, "Write failed");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop<R>(
    conn: Connection,
    mut stream: R,
    mut registration: Registration,
    events: mpsc::UnboundedSender<Event>,
) where
    R: futures_util::Stream<Item = Result<Message, bantracker_proto::ProtocolError>> + Unpin,
{
    while let Some(next) = stream.next().await {
        let msg = match next {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Read failed");
                break;
            }
        };
        trace!("< {}", msg);

        if msg.command == "PING" {
            let _ = conn.send(Message::pong(msg.params.last().cloned().unwrap_or_default()));
        }

        let event = {
            let mut state = conn.inner.state.write();
            state.apply(&msg);
            Event::from_message(&msg, &state)
        };

        for reply in registration.step(&msg) {
            let _ = conn.send(reply);
        }

        conn.dispatch(&msg);

        if let Some(event) = event
            && events.send(event).is_err()
        {
            break;
        }
    }

    debug!(network = %conn.name(), "Connection closed");
    // Wake any pending waits.
    conn.inner.waiters.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    fn config() -> NetworkConfig {
        toml::from_str(
            r#"
            name = "test"
            host = "irc.example.net"
            nick = "bt"
            send_rate_per_second = 1000
            send_burst = 1000
            "#,
        )
        .unwrap()
    }

    async fn read_line(reader: &mut BufReader<DuplexStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    #[tokio::test]
    async fn test_registration_burst_and_ping() {
        let (client, server) = tokio::io::duplex(4096);
        let (conn, mut events) = Connection::start(&config(), client);
        let mut server = BufReader::new(server);

        assert_eq!(read_line(&mut server).await, "CAP LS 302");
        assert_eq!(read_line(&mut server).await, "NICK bt");
        assert_eq!(read_line(&mut server).await, "USER bt 0 * bt");

        server
            .get_mut()
            .write_all(b":srv CAP * LS :sasl\r\n:srv 001 bt :Welcome\r\nPING :tok\r\n")
            .await
            .unwrap();

        assert_eq!(read_line(&mut server).await, "CAP END");
        assert_eq!(events.recv().await, Some(Event::Registered));
        assert_eq!(read_line(&mut server).await, "PONG tok");
        assert!(conn.with_state(|s| s.registered));
    }

    #[tokio::test]
    async fn test_subscription_receives_matching_lines() {
        let (client, server) = tokio::io::duplex(4096);
        let (conn, _events) = Connection::start(&config(), client);
        let mut server = BufReader::new(server);

        let mut sub = conn.subscribe(|m| m.command == "367");
        server
            .get_mut()
            .write_all(b":srv 366 bt #c :end\r\n:srv 367 bt #c *!*@x op 1\r\n")
            .await
            .unwrap();

        let msg = sub.wait(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(msg.param(2), Some("*!*@x"));

        let timed_out = sub.wait(Some(Duration::from_millis(20))).await;
        assert!(matches!(timed_out, Err(ClientError::Timeout(_))));

        drop(sub);
        assert!(conn.inner.waiters.lock().is_empty());
    }

    #[tokio::test]
    async fn test_close_ends_events_and_waits() {
        let (client, server) = tokio::io::duplex(4096);
        let (conn, mut events) = Connection::start(&config(), client);
        let mut sub = conn.subscribe(|_| false);
        drop(server);

        assert_eq!(events.recv().await, None);
        assert!(matches!(sub.wait(None).await, Err(ClientError::Closed)));
    }
}
