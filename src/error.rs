//! Unified error handling for bantracker.
//!
//! Storage and configuration errors live with their modules ([`DbError`],
//! [`ConfigError`]). This module holds the connection, enforcement and
//! command error hierarchies built on top of them.

use std::time::Duration;

use bantracker_proto::ProtocolError;
use thiserror::Error;

use crate::config::{ChannelSetError, ConfigError, UnknownKey};
use crate::db::DbError;

// ============================================================================
// Client Errors (connection layer)
// ============================================================================

/// Errors from the connection layer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("connection closed")]
    Closed,

    #[error("timed out after {0:?} waiting for a reply")]
    Timeout(Duration),
}

// ============================================================================
// Enforcement Errors (automated passes, logged only)
// ============================================================================

/// Errors that abort one enforcement or removal batch.
#[derive(Debug, Error)]
pub enum EnforceError {
    #[error("not opped in {0} and op requests are disabled")]
    NotOpped(String),

    #[error("timed out waiting for op in {0}")]
    OpTimeout(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EnforceError {
    /// Get a static error code string for log fields.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotOpped(_) => "not_opped",
            Self::OpTimeout(_) => "op_timeout",
            Self::Client(_) => "client_error",
            Self::Db(_) => "db_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Whether this is a transient protocol condition rather than a fault.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotOpped(_) | Self::OpTimeout(_))
    }
}

// ============================================================================
// Command Errors (user-facing)
// ============================================================================

/// Errors from in-channel commands. `Display` is the text sent back to the
/// issuer.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("This command must be used in a channel")]
    NotInChannel,

    #[error("You do not have permission to do this")]
    PermissionDenied,

    #[error("Please provide a key and value")]
    MissingKeyValue,

    #[error("Unknown setting '{0}'")]
    UnknownSetting(String),

    #[error("Please provide a numeric ban id")]
    InvalidId(String),

    #[error("There is no active ban or quiet in this channel")]
    NoLastRestriction,

    #[error("Ban {0} does not exist")]
    NotFound(i64),

    #[error("Please provide a duration, a reason or both")]
    MissingDurationOrReason,

    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("Internal error, please try again later")]
    Db(#[source] DbError),

    #[error("Internal error, please try again later")]
    Config(#[source] ConfigError),
}

impl CommandError {
    /// Internal failures are logged; malformed input is only reported.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Db(_) | Self::Config(_))
    }
}

impl From<DbError> for CommandError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::RestrictionNotFound(id) => CommandError::NotFound(id),
            other => CommandError::Db(other),
        }
    }
}

impl From<ChannelSetError> for CommandError {
    fn from(err: ChannelSetError) -> Self {
        match err {
            ChannelSetError::UnknownKey(UnknownKey(key)) => CommandError::UnknownSetting(key),
            ChannelSetError::Persist(e) => CommandError::Config(e),
        }
    }
}

impl From<ConfigError> for CommandError {
    fn from(err: ConfigError) -> Self {
        CommandError::Config(err)
    }
}
