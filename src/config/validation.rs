//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one [[network]] block is required")]
    NoNetworks,
    #[error("network name '{0}' must be letters, digits, '-' or '_'")]
    InvalidNetworkName(String),
    #[error("network name '{0}' is used more than once")]
    DuplicateNetwork(String),
    #[error("network '{0}': nick is required")]
    MissingNick(String),
    #[error("network '{0}': host is required")]
    MissingHost(String),
    #[error("network '{0}': send_rate_per_second and send_burst must be positive")]
    InvalidSendRate(String),
    #[error("bot.trigger must not be empty")]
    EmptyTrigger,
    #[error("bot.quiet must be a mode letter other than 'b', got '{0}'")]
    InvalidQuietMode(char),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bot.trigger.is_empty() {
        errors.push(ValidationError::EmptyTrigger);
    }
    if let Some(q) = config.bot.quiet
        && (q == 'b' || !q.is_ascii_alphabetic())
    {
        errors.push(ValidationError::InvalidQuietMode(q));
    }

    if config.networks.is_empty() {
        errors.push(ValidationError::NoNetworks);
    }

    let mut names = HashSet::new();
    for net in &config.networks {
        // Names become directory names under data_dir.
        if net.name.is_empty()
            || !net
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            errors.push(ValidationError::InvalidNetworkName(net.name.clone()));
        }
        if !names.insert(net.name.as_str()) {
            errors.push(ValidationError::DuplicateNetwork(net.name.clone()));
        }
        if net.nick.is_empty() {
            errors.push(ValidationError::MissingNick(net.name.clone()));
        }
        if net.host.is_empty() {
            errors.push(ValidationError::MissingHost(net.name.clone()));
        }
        if net.send_rate_per_second == 0 || net.send_burst == 0 {
            errors.push(ValidationError::InvalidSendRate(net.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
