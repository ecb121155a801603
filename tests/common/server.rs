//! Scripted IRC server.
//!
//! Accepts the bot's connection, walks it through registration and then
//! plays whatever the test sends.

use std::sync::Arc;
use std::time::Duration;

use bantracker::config::{BotConfig, ChannelConfigStore, NetworkConfig};
use bantracker::db::Database;
use bantracker::run_network;
use bantracker::tracker::Context;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const NICK: &str = "bt";

/// Nick that issues the settle command. Never joins any channel.
const SETTLE: &str = "settler";

/// A listening socket the bot connects to.
pub struct TestServer {
    listener: TcpListener,
}

impl TestServer {
    pub async fn bind() -> anyhow::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind("127.0.0.1:0").await?,
        })
    }

    pub fn port(&self) -> anyhow::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Wait for the bot to connect.
    pub async fn accept(&self) -> anyhow::Result<ServerConn> {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept()).await??;
        let (read_half, write_half) = stream.into_split();
        Ok(ServerConn {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }
}

/// One accepted bot connection.
pub struct ServerConn {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl ServerConn {
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn send_all(&mut self, lines: &[&str]) -> anyhow::Result<()> {
        for line in lines {
            self.send_raw(line).await?;
        }
        Ok(())
    }

    /// Next line from the bot, skipping its periodic expiry pings.
    pub async fn recv(&mut self) -> anyhow::Result<String> {
        loop {
            let mut line = String::new();
            let n = timeout(Duration::from_secs(5), self.reader.read_line(&mut line)).await??;
            if n == 0 {
                anyhow::bail!("bot closed the connection");
            }
            let line = line.trim_end().to_string();
            if line != "PING expirecheck" {
                return Ok(line);
            }
        }
    }

    /// Round-trip a command so everything sent before it has been handled
    /// by the tracker, not just read off the socket.
    ///
    /// `set` in private always fails with a NOTICE, and commands are handled
    /// in order after every earlier event.
    pub async fn settle(&mut self) -> anyhow::Result<()> {
        self.send_raw(&format!(":{SETTLE}!s@settle.host PRIVMSG {NICK} :!set trigger !"))
            .await?;
        let line = self.recv().await?;
        anyhow::ensure!(
            line == format!("NOTICE {SETTLE} :This command must be used in a channel"),
            "unexpected line before settle reply: {line}"
        );
        Ok(())
    }

    /// Complete CAP negotiation and registration.
    pub async fn register(&mut self) -> anyhow::Result<()> {
        assert_eq!(self.recv().await?, "CAP LS 302");
        assert_eq!(self.recv().await?, format!("NICK {NICK}"));
        assert!(self.recv().await?.starts_with("USER "));

        self.send_raw(":srv CAP * LS :multi-prefix extended-join sasl")
            .await?;
        assert_eq!(self.recv().await?, "CAP REQ :multi-prefix extended-join");
        self.send_raw(":srv CAP * ACK :multi-prefix extended-join")
            .await?;
        assert_eq!(self.recv().await?, "CAP END");

        self.send_all(&[
            &format!(":srv 001 {NICK} :Welcome to the test network"),
            &format!(
                ":srv 005 {NICK} PREFIX=(ov)@+ CHANMODES=eIbq,k,flj,imnpst MODES=4 \
                 CASEMAPPING=rfc1459 EXTBAN=$,ajrxz :are supported"
            ),
        ])
        .await
    }

    /// Answer the bot's join of `channel`: JOIN echo, NAMES, then the list
    /// query with the given 367/728 lines.
    pub async fn join(&mut self, channel: &str, names: &str, list: &[&str]) -> anyhow::Result<()> {
        self.send_all(&[
            &format!(":{NICK}!b@bot.host JOIN {channel}"),
            &format!(":srv 353 {NICK} = {channel} :{names}"),
            &format!(":srv 366 {NICK} {channel} :End of /NAMES list."),
        ])
        .await?;
        assert_eq!(self.recv().await?, format!("WHO {channel} %tcuhnfar,735"));
        assert_eq!(self.recv().await?, format!("MODE {channel} +bq"));

        self.send_all(list).await?;
        self.send_all(&[
            &format!(":srv 368 {NICK} {channel} :End of Channel Ban List"),
            &format!(":srv 729 {NICK} {channel} q :End of Channel Quiet List"),
        ])
        .await?;
        self.settle().await
    }
}

/// A running bot and its scratch directory. Aborts the bot on drop.
pub struct BotHandle {
    pub ctx: Context,
    task: JoinHandle<()>,
    _dir: TempDir,
}

impl Drop for BotHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start the supervisor for one network pointed at `server`.
pub async fn spawn_bot(
    server: &TestServer,
    bot: BotConfig,
    channels: &[&str],
) -> anyhow::Result<BotHandle> {
    let dir = tempfile::tempdir()?;
    let bot = BotConfig {
        data_dir: dir.path().to_path_buf(),
        quiet: Some('q'),
        ..bot
    }
    .for_network("test");
    let db = Database::new(&bot.database_path().to_string_lossy()).await?;
    let ctx = Context::new(db, Arc::new(ChannelConfigStore::new(bot.channels_dir())), bot);

    let network: NetworkConfig = toml::from_str(&format!(
        r#"
        name = "test"
        host = "127.0.0.1"
        port = {port}
        tls = false
        nick = "{NICK}"
        channels = [{channels}]
        send_rate_per_second = 1000
        send_burst = 1000
        reconnect_delay_secs = 0
        "#,
        port = server.port()?,
        channels = channels
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", "),
    ))?;

    let task = tokio::spawn(run_network(ctx.clone(), network));
    Ok(BotHandle {
        ctx,
        task,
        _dir: dir,
    })
}
