use std::fs;
use std::io::Result as IoResult;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use capctl::Cap;
use nix::unistd::Uid;

/// Represents the result of running the launcher
#[derive(Debug)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_drop_net_admin"))
}

/// Run the launcher with `args` after its own name
pub fn run_launcher(args: &[&str]) -> IoResult<CommandResult> {
    let output = Command::new(binary_path())
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;
    let result = CommandResult {
        success: output.status.success(),
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };
    println!("Output : {}", result.stdout);
    println!("Error  : {}", result.stderr);
    Ok(result)
}

/// Read a capability mask such as `CapBnd` out of a /proc/<pid>/status dump
pub fn capability_mask(status: &str, field: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with(&format!("{}:", field)))
        .and_then(|line| line.split(':').last())
        .and_then(|hex| u64::from_str_radix(hex.trim(), 16).ok())
}

pub fn has_cap(mask: u64, cap: Cap) -> bool {
    mask & (1u64 << cap as u8) != 0
}

/// Whether the launcher, started from this process, will be able to shrink its bounding set
pub fn expect_privileged() -> bool {
    let status = fs::read_to_string("/proc/self/status").unwrap_or_default();
    Uid::effective().is_root()
        && capability_mask(&status, "CapBnd")
            .map(|bnd| has_cap(bnd, Cap::SETPCAP))
            .unwrap_or(false)
}
