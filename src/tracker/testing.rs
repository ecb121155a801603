//! Scripted server for tracker unit tests.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use super::Context;
use crate::client::{Connection, Events};
use crate::config::{BotConfig, ChannelConfigStore, NetworkConfig};
use crate::db::Database;

pub const NICK: &str = "bt";

/// The server end of a duplex pipe.
pub struct FakeServer {
    reader: BufReader<DuplexStream>,
}

impl FakeServer {
    /// Next line the client sent.
    pub async fn expect(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a client line")
            .unwrap();
        line.trim_end().to_string()
    }

    pub async fn send(&mut self, lines: &[&str]) {
        for line in lines {
            let stream = self.reader.get_mut();
            stream.write_all(line.as_bytes()).await.unwrap();
            stream.write_all(b"\r\n").await.unwrap();
        }
    }

    /// Round-trip a PING so every line sent before it has been applied.
    /// Panics on any other client line.
    pub async fn settle(&mut self) {
        self.send(&["PING :settle"]).await;
        let line = self.expect().await;
        assert_eq!(line, "PONG settle", "unexpected client line");
    }

    /// Join `channel` with the given NAMES entries.
    pub async fn join(&mut self, channel: &str, names: &str) {
        let join = format!(":{NICK}!b@bot.host JOIN {channel}");
        let names = format!(":srv 353 {NICK} = {channel} :{names}");
        let end = format!(":srv 366 {NICK} {channel} :End of /NAMES list.");
        self.send(&[&join, &names, &end]).await;
        self.settle().await;
    }
}

pub struct Harness {
    pub ctx: Context,
    pub conn: Connection,
    pub events: Events,
    pub server: FakeServer,
    _dir: TempDir,
}

impl Harness {
    /// Borrow the client side and the server side at once.
    pub fn split(&mut self) -> (&Context, &Connection, &mut FakeServer) {
        (&self.ctx, &self.conn, &mut self.server)
    }
}

fn network() -> NetworkConfig {
    toml::from_str(&format!(
        r#"
        name = "test"
        host = "irc.example.net"
        nick = "{NICK}"
        tls = false
        send_rate_per_second = 1000
        send_burst = 1000
        "#
    ))
    .unwrap()
}

/// A registered connection on a network with `q` quiets and `MODES=4`.
pub async fn harness(bot: BotConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::new(
        Database::new(":memory:").await.unwrap(),
        Arc::new(ChannelConfigStore::new(dir.path())),
        bot,
    );

    let (client, server) = tokio::io::duplex(64 * 1024);
    let (conn, events) = Connection::start(&network(), client);
    let mut server = FakeServer {
        reader: BufReader::new(server),
    };

    for _ in 0..3 {
        server.expect().await;
    }
    let welcome = format!(":srv 001 {NICK} :Welcome");
    let isupport = format!(
        ":srv 005 {NICK} PREFIX=(ov)@+ CHANMODES=eIbq,k,flj,imnpst MODES=4 \
         CASEMAPPING=rfc1459 EXTBAN=$,ajrxz :are supported"
    );
    server.send(&[&welcome, &isupport]).await;
    server.settle().await;

    Harness {
        ctx,
        conn,
        events,
        server,
        _dir: dir,
    }
}

/// Bot defaults with quiets tracked as `q`.
pub fn bot() -> BotConfig {
    BotConfig {
        quiet: Some('q'),
        ..BotConfig::default()
    }
}
