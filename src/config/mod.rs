//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: The TOML config file (`[bot]` defaults, `[[network]]` blocks)
//! - [`channel`]: Per-channel overrides persisted one file per channel
//! - [`validation`]: Startup checks
//! - [`defaults`]: Serde default functions

mod channel;
mod defaults;
mod types;
mod validation;

pub use channel::{
    AppliedValue, ChannelConfig, ChannelConfigProvider, ChannelConfigStore, ChannelSetError,
    EffectivePolicy, UnknownKey,
};
pub use types::{BotConfig, Config, ConfigError, LogFormat, NetworkConfig};
pub use validation::{ValidationError, validate};
