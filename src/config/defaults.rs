//! Default value functions for configuration.

use std::path::PathBuf;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Bot Defaults
// =============================================================================

pub fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

pub fn default_trigger() -> String {
    "!".to_string()
}

pub fn default_chanserv_nick() -> String {
    "ChanServ".to_string()
}

pub fn default_op_timeout_secs() -> u64 {
    5
}

// =============================================================================
// Network Defaults
// =============================================================================

pub fn default_port() -> u16 {
    6697
}

pub fn default_send_rate() -> u32 {
    2
}

pub fn default_send_burst() -> u32 {
    5
}

pub fn default_reconnect_delay_secs() -> u64 {
    30
}
