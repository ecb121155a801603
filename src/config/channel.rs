//! Per-channel configuration overrides.
//!
//! Each channel may override the global trigger, enforcement policy and
//! ChanServ op-request policy. Overrides are persisted as one TOML file per
//! channel under `<data_dir>/channels/`.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{BotConfig, ConfigError};

/// A key passed to `set` that is not a channel setting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown setting: {0}")]
pub struct UnknownKey(pub String);

/// Errors from changing a channel setting.
#[derive(Debug, Error)]
pub enum ChannelSetError {
    #[error(transparent)]
    UnknownKey(#[from] UnknownKey),
    #[error(transparent)]
    Persist(#[from] ConfigError),
}

/// The normalized value a `set` stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedValue {
    Trigger(String),
    Enforce(bool),
    Chanserv(bool),
}

impl AppliedValue {
    pub fn key(&self) -> &'static str {
        match self {
            AppliedValue::Trigger(_) => "trigger",
            AppliedValue::Enforce(_) => "enforce",
            AppliedValue::Chanserv(_) => "chanserv",
        }
    }
}

impl fmt::Display for AppliedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppliedValue::Trigger(t) => f.write_str(t),
            AppliedValue::Enforce(b) | AppliedValue::Chanserv(b) => {
                f.write_str(if *b { "yes" } else { "no" })
            }
        }
    }
}

fn yes_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "on" | "1" | "true"
    )
}

/// Optional overrides for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chanserv: Option<bool>,
}

/// Channel settings after falling back to the global defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub trigger: String,
    pub enforce: bool,
    pub chanserv: bool,
}

impl ChannelConfig {
    /// Set `key` from its textual `value`.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<AppliedValue, UnknownKey> {
        match key.to_ascii_lowercase().as_str() {
            "trigger" => {
                self.trigger = Some(value.to_string());
                Ok(AppliedValue::Trigger(value.to_string()))
            }
            "enforce" => {
                let b = yes_bool(value);
                self.enforce = Some(b);
                Ok(AppliedValue::Enforce(b))
            }
            "chanserv" => {
                let b = yes_bool(value);
                self.chanserv = Some(b);
                Ok(AppliedValue::Chanserv(b))
            }
            _ => Err(UnknownKey(key.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trigger.is_none() && self.enforce.is_none() && self.chanserv.is_none()
    }

    pub fn effective(&self, bot: &BotConfig) -> EffectivePolicy {
        EffectivePolicy {
            trigger: self.trigger.clone().unwrap_or_else(|| bot.trigger.clone()),
            enforce: self.enforce.unwrap_or(bot.enforce),
            chanserv: self.chanserv.unwrap_or(bot.chanserv),
        }
    }
}

/// Source of per-channel overrides. Channel names are already case-folded.
#[async_trait]
pub trait ChannelConfigProvider: Send + Sync {
    /// Current overrides for `channel` (all `None` if never set).
    async fn get(&self, channel: &str) -> Result<ChannelConfig, ConfigError>;

    /// Apply and persist one setting.
    async fn apply(
        &self,
        channel: &str,
        key: &str,
        value: &str,
    ) -> Result<AppliedValue, ChannelSetError>;
}

/// File-backed [`ChannelConfigProvider`] with an in-memory cache.
///
/// Updates to one channel hold that channel's cache entry for the duration of
/// the file write, so concurrent `set`s on the same channel serialize.
pub struct ChannelConfigStore {
    dir: PathBuf,
    cache: DashMap<String, ChannelConfig>,
}

impl ChannelConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: DashMap::new(),
        }
    }

    fn path_for(&self, channel: &str) -> PathBuf {
        let name: String = channel
            .chars()
            .map(|c| if std::path::is_separator(c) { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.toml", name))
    }

    fn load(path: &Path) -> Result<ChannelConfig, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ChannelConfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, path: &Path, config: &ChannelConfig) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.dir)?;
        let content = toml::to_string(config)?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl ChannelConfigProvider for ChannelConfigStore {
    async fn get(&self, channel: &str) -> Result<ChannelConfig, ConfigError> {
        if let Some(config) = self.cache.get(channel) {
            return Ok(config.clone());
        }

        let path = self.path_for(channel);
        let config = Self::load(&path).inspect_err(|e| {
            warn!(channel = %channel, path = %path.display(), error = %e, "Failed to load channel config");
        })?;
        Ok(self
            .cache
            .entry(channel.to_string())
            .or_insert(config)
            .clone())
    }

    async fn apply(
        &self,
        channel: &str,
        key: &str,
        value: &str,
    ) -> Result<AppliedValue, ChannelSetError> {
        let path = self.path_for(channel);
        let loaded = if self.cache.contains_key(channel) {
            None
        } else {
            Some(Self::load(&path)?)
        };

        let mut entry = self
            .cache
            .entry(channel.to_string())
            .or_insert_with(|| loaded.unwrap_or_default());

        let mut updated = entry.clone();
        let applied = updated.apply(key, value)?;
        self.save(&path, &updated)?;
        *entry = updated;

        debug!(channel = %channel, key = applied.key(), value = %applied, "Channel setting changed");
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_known_keys() {
        let mut config = ChannelConfig::default();
        assert_eq!(
            config.apply("trigger", "."),
            Ok(AppliedValue::Trigger(".".into()))
        );
        assert_eq!(config.apply("enforce", "on"), Ok(AppliedValue::Enforce(true)));
        assert_eq!(config.apply("chanserv", "nope"), Ok(AppliedValue::Chanserv(false)));
        assert_eq!(config.trigger.as_deref(), Some("."));
        assert_eq!(config.enforce, Some(true));
        assert_eq!(config.chanserv, Some(false));
    }

    #[test]
    fn test_apply_unknown_key() {
        let mut config = ChannelConfig::default();
        assert_eq!(
            config.apply("colour", "blue"),
            Err(UnknownKey("colour".into()))
        );
        assert!(config.is_empty());
    }

    #[test]
    fn test_yes_bool() {
        for yes in ["yes", "on", "1", "true", "YES"] {
            assert!(yes_bool(yes), "{yes}");
        }
        for no in ["no", "off", "0", "", "y"] {
            assert!(!yes_bool(no), "{no}");
        }
    }

    #[test]
    fn test_effective_falls_back_to_global() {
        let bot = BotConfig {
            enforce: true,
            ..BotConfig::default()
        };
        let mut config = ChannelConfig::default();
        assert_eq!(
            config.effective(&bot),
            EffectivePolicy {
                trigger: "!".into(),
                enforce: true,
                chanserv: false
            }
        );

        config.apply("enforce", "no").unwrap();
        config.apply("trigger", "?").unwrap();
        let effective = config.effective(&bot);
        assert!(!effective.enforce);
        assert_eq!(effective.trigger, "?");
    }

    #[test]
    fn test_applied_value_display() {
        assert_eq!(AppliedValue::Enforce(true).to_string(), "yes");
        assert_eq!(AppliedValue::Chanserv(false).to_string(), "no");
        assert_eq!(AppliedValue::Trigger("!".into()).to_string(), "!");
    }

    #[tokio::test]
    async fn test_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let store = ChannelConfigStore::new(dir.path());
        assert!(store.get("#chan").await.unwrap().is_empty());
        store.apply("#chan", "enforce", "yes").await.unwrap();
        store.apply("#chan", "trigger", "@").await.unwrap();

        assert!(dir.path().join("#chan.toml").exists());

        let reopened = ChannelConfigStore::new(dir.path());
        let config = reopened.get("#chan").await.unwrap();
        assert_eq!(config.enforce, Some(true));
        assert_eq!(config.trigger.as_deref(), Some("@"));
        assert!(reopened.get("#other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_unknown_key_does_not_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChannelConfigStore::new(dir.path());

        assert!(matches!(
            store.apply("#chan", "bogus", "1").await,
            Err(ChannelSetError::UnknownKey(_))
        ));
        assert!(!dir.path().join("#chan.toml").exists());
    }
}
