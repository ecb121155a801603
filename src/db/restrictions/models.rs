//! Restriction models and data structures.

use std::fmt;

use crate::db::DbError;

/// What a restriction does to matching users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RestrictionKind {
    /// Prevents joining; present members are kicked.
    Ban,
    /// Prevents speaking; voiced members are devoiced.
    Quiet,
}

impl RestrictionKind {
    /// Storage code.
    pub fn as_i64(self) -> i64 {
        match self {
            RestrictionKind::Ban => 1,
            RestrictionKind::Quiet => 2,
        }
    }

    /// Decode a storage code.
    pub fn from_i64(code: i64) -> Result<Self, DbError> {
        match code {
            1 => Ok(RestrictionKind::Ban),
            2 => Ok(RestrictionKind::Quiet),
            other => Err(DbError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for RestrictionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RestrictionKind::Ban => "Ban",
            RestrictionKind::Quiet => "Quiet",
        })
    }
}

/// A restriction record with its latest reason and expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
    pub id: i64,
    /// Case-folded channel name.
    pub channel: String,
    pub kind: RestrictionKind,
    pub mask: String,
    /// Source (`nick!user@host`, or a nick/server from a list reply) that set it.
    pub set_by: String,
    /// Unix timestamp when the restriction was set.
    pub set_at: i64,
    /// Who removed it, when known.
    pub removed_by: Option<String>,
    /// Unix timestamp of removal; `None` while active.
    pub removed_at: Option<i64>,
    /// Latest reason, if one was ever given.
    pub reason: Option<String>,
    /// Latest absolute expiry, if one was ever given.
    pub expires_at: Option<i64>,
}

impl Restriction {
    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }
}

/// An active restriction as seen by synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActiveRestriction {
    pub id: i64,
    pub kind: RestrictionKind,
    pub mask: String,
}

/// One entry of a restriction's reason history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonEntry {
    pub set_by: String,
    pub set_at: i64,
    pub reason: String,
}

/// One entry of a restriction's expiration history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationEntry {
    pub set_by: String,
    pub set_at: i64,
    /// Absolute Unix timestamp.
    pub expires_at: i64,
}

/// An active restriction whose latest expiry has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredRestriction {
    pub channel: String,
    pub kind: RestrictionKind,
    pub mask: String,
    pub id: i64,
}
