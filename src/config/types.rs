//! Core configuration types and loading.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Bantracker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Global defaults shared by every network.
    pub bot: BotConfig,
    /// One block per independent network connection.
    #[serde(default, rename = "network")]
    pub networks: Vec<NetworkConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Global bot behaviour. Channel overrides take precedence where they exist.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Directory holding the database and per-channel config files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Command prefix (e.g. `!` for `!comment`).
    #[serde(default = "default_trigger")]
    pub trigger: String,
    /// Kick/devoice members affected by new restrictions.
    #[serde(default)]
    pub enforce: bool,
    /// Ask ChanServ for ops when enforcement or expiry needs them.
    #[serde(default)]
    pub chanserv: bool,
    /// Services nickname used for op requests.
    #[serde(default = "default_chanserv_nick")]
    pub chanserv_nick: String,
    /// Quiet list mode letter (`q` on solanum). Quiets are not tracked when unset.
    #[serde(default)]
    pub quiet: Option<char>,
    /// Custom extban templates, e.g. `$j:{account}`. Placeholders are
    /// `{account}`, `{hostmask}` and `{realname}`.
    #[serde(default)]
    pub extbans: Vec<String>,
    /// Seconds to wait for ChanServ to op us.
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            trigger: default_trigger(),
            enforce: false,
            chanserv: false,
            chanserv_nick: default_chanserv_nick(),
            quiet: None,
            extbans: Vec::new(),
            op_timeout_secs: default_op_timeout_secs(),
            log_format: LogFormat::default(),
        }
    }
}

impl BotConfig {
    /// The settings one network runs with. Each network keeps its history
    /// and channel settings under its own `data_dir/<name>`, so equal
    /// channel names on different networks never share records.
    pub fn for_network(&self, name: &str) -> BotConfig {
        BotConfig {
            data_dir: self.data_dir.join(name),
            ..self.clone()
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("bantracker.db")
    }

    pub fn channels_dir(&self) -> PathBuf {
        self.data_dir.join("channels")
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }

    /// Mode letters listed when synchronizing: `b` plus the quiet letter.
    pub fn list_modes(&self) -> String {
        let mut modes = String::from("b");
        modes.extend(self.quiet);
        modes
    }
}

/// One network connection.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Label used in logs and as this network's directory under `data_dir`.
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub tls: bool,
    /// Verify the server certificate against the system roots.
    #[serde(default = "default_true")]
    pub tls_verify: bool,
    pub nick: String,
    /// Defaults to `nick`.
    #[serde(default)]
    pub username: Option<String>,
    /// Defaults to `nick`.
    #[serde(default)]
    pub realname: Option<String>,
    /// Server password (PASS), if the network requires one.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    /// Outgoing lines per second once the burst is spent.
    #[serde(default = "default_send_rate")]
    pub send_rate_per_second: u32,
    #[serde(default = "default_send_burst")]
    pub send_burst: u32,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl NetworkConfig {
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nick)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"
        [bot]

        [[network]]
        name = "libera"
        host = "irc.libera.chat"
        nick = "bantracker"
        channels = ["#a", "#b"]
    "##;

    #[test]
    fn test_minimal_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.bot.trigger, "!");
        assert!(!config.bot.enforce);
        assert!(!config.bot.chanserv);
        assert_eq!(config.bot.chanserv_nick, "ChanServ");
        assert_eq!(config.bot.quiet, None);
        assert_eq!(config.bot.op_timeout(), Duration::from_secs(5));
        assert_eq!(config.bot.list_modes(), "b");

        let net = &config.networks[0];
        assert_eq!(net.port, 6697);
        assert!(net.tls);
        assert!(net.tls_verify);
        assert_eq!(net.username(), "bantracker");
        assert_eq!(net.channels, vec!["#a", "#b"]);
    }

    #[test]
    fn test_full_bot_section() {
        let config: Config = toml::from_str(
            r#"
            [bot]
            data_dir = "/var/lib/bantracker"
            trigger = "."
            enforce = true
            chanserv = true
            quiet = "q"
            extbans = ["$j:{account}", "$x:{hostmask}#{realname}"]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.bot.quiet, Some('q'));
        assert_eq!(config.bot.list_modes(), "bq");
        assert_eq!(config.bot.extbans.len(), 2);
        assert_eq!(config.bot.log_format, LogFormat::Json);
        assert_eq!(
            config.bot.database_path(),
            PathBuf::from("/var/lib/bantracker/bantracker.db")
        );
        assert!(config.networks.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/bantracker.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_networks_get_separate_stores() {
        let bot = BotConfig {
            data_dir: PathBuf::from("/var/lib/bantracker"),
            ..BotConfig::default()
        };
        let libera = bot.for_network("libera");
        let oftc = bot.for_network("oftc");
        assert_eq!(
            libera.database_path(),
            PathBuf::from("/var/lib/bantracker/libera/bantracker.db")
        );
        assert_eq!(
            oftc.channels_dir(),
            PathBuf::from("/var/lib/bantracker/oftc/channels")
        );
        assert_ne!(libera.database_path(), oftc.database_path());
        assert_eq!(libera.trigger, bot.trigger);
    }

    #[test]
    fn test_example_config_is_valid() {
        let config: Config = toml::from_str(include_str!("../../config.example.toml")).unwrap();
        assert_eq!(config.bot.quiet, Some('q'));
        assert_eq!(config.networks[0].channels.len(), 2);
        assert!(crate::config::validate(&config).is_ok());
    }
}
