//! Repository for channel restrictions (bans and quiets).

mod models;
mod queries;

pub use models::{
    ActiveRestriction, ExpirationEntry, ExpiredRestriction, ReasonEntry, Restriction,
    RestrictionKind,
};
pub use queries::RestrictionRepository;
