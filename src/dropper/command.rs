use std::ffi::{CStr, CString};

use nix::{errno::Errno, unistd::execvp};

/// Replace the process image with `command`, searching PATH. Only returns on failure.
pub fn replace_image(command: &CStr, argv: &[CString]) -> Errno {
    match execvp(command, argv) {
        Ok(never) => match never {},
        Err(errno) => errno,
    }
}
