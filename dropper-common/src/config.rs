use capctl::Cap;
use tracing::Level;

/// Capability removed from the bounding set before the target command runs
pub const DROPPED_CAPABILITY: Cap = Cap::NET_ADMIN;

/// Capability the kernel requires in the effective set to shrink the bounding set
pub const BOUNDING_PRIVILEGE: Cap = Cap::SETPCAP;

pub const SYSLOG_IDENTITY: &str = "drop_net_admin";

#[cfg(debug_assertions)]
pub const LOG_LEVEL: Level = Level::DEBUG;

#[cfg(not(debug_assertions))]
pub const LOG_LEVEL: Level = Level::WARN;
