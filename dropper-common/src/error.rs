use std::{
    fmt,
    process::{ExitCode, Termination},
};

use capctl::Cap;
use nix::errno::Errno;
use strum::EnumIs;
use tracing::error;

use crate::{
    config::{BOUNDING_PRIVILEGE, DROPPED_CAPABILITY},
    util::cap_name,
};

/// Exit status of a malformed invocation
pub const USAGE_FAILURE: u8 = 1;
/// Exit status of a failed capability step, `-1` as the shell sees it
pub const CAPABILITY_FAILURE: u8 = -1i8 as u8;
/// Exit status of a failed handle release, `-2` as the shell sees it
pub const RELEASE_FAILURE: u8 = -2i8 as u8;

/// Every way the launcher can stop before the target command takes over
#[derive(Debug, Clone, PartialEq, Eq, EnumIs)]
pub enum DropError {
    /// No command was given
    Usage { program: String },
    /// The kernel could not report the process capability state
    CapabilityRead(Errno),
    /// A flag operation on a stored capability state failed
    CapabilityMutate { operation: String, errno: Errno },
    /// The baseline copy of the capability state is unavailable
    CapabilityDuplicate(Errno),
    /// The kernel refused to shrink the bounding set
    CapabilityBoundingDrop { cap: Cap, errno: Errno },
    /// The baseline could not be applied back onto the process
    CapabilityRestore(Errno),
    /// A capability state handle could not be released
    ResourceRelease(Errno),
    /// Process replacement failed, `status` is what the earlier steps accumulated
    Exec {
        command: String,
        errno: Errno,
        status: u8,
    },
}

impl DropError {
    pub fn mutate<S: Into<String>>(operation: S, errno: Errno) -> Self {
        Self::CapabilityMutate {
            operation: operation.into(),
            errno,
        }
    }

    /// True for the failures of the capability pipeline itself
    pub fn is_capability_error(&self) -> bool {
        matches!(
            self,
            Self::CapabilityRead(_)
                | Self::CapabilityMutate { .. }
                | Self::CapabilityDuplicate(_)
                | Self::CapabilityBoundingDrop { .. }
                | Self::CapabilityRestore(_)
        )
    }

    pub fn status(&self) -> u8 {
        match self {
            Self::Usage { .. } => USAGE_FAILURE,
            Self::ResourceRelease(_) => RELEASE_FAILURE,
            Self::Exec { status, .. } => *status,
            _ => CAPABILITY_FAILURE,
        }
    }

    /// Print the one line diagnostic on stderr and mirror it to the log
    pub fn diagnose(&self, program: &str) {
        error!("{}", self);
        if self.is_usage() {
            eprintln!("{}", self);
        } else {
            eprintln!("{}: {}", program, self);
        }
    }
}

impl Termination for DropError {
    fn report(self) -> ExitCode {
        ExitCode::from(self.status())
    }
}

impl fmt::Display for DropError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage { program } => write!(f, "usage: {} <command> [args...]", program),
            Self::CapabilityRead(errno) => {
                write!(f, "unable to read process capabilities: {}", errno)
            }
            Self::CapabilityMutate { operation, errno } => {
                write!(f, "unable to {}: {}", operation, errno)
            }
            Self::CapabilityDuplicate(errno) => {
                write!(f, "failed to get caps: {}", errno)
            }
            Self::CapabilityBoundingDrop { cap, errno } => {
                write!(f, "unable to drop {}: {}", cap_name(*cap), errno)
            }
            Self::CapabilityRestore(errno) => write!(
                f,
                "failed to lower {} after dropping {}: {}",
                cap_name(BOUNDING_PRIVILEGE),
                cap_name(DROPPED_CAPABILITY),
                errno
            ),
            Self::ResourceRelease(errno) => {
                write!(f, "failed to release capability state: {}", errno)
            }
            Self::Exec { command, errno, .. } => {
                write!(f, "unable to execute {}: {}", command, errno)
            }
        }
    }
}

impl std::error::Error for DropError {}

pub type DropResult<T> = Result<T, DropError>;
