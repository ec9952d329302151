use std::io;

use capctl::{Cap, CapSet};
use nix::errno::Errno;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LOG_LEVEL;

pub fn cap_name(cap: Cap) -> String {
    format!("CAP_{:?}", cap)
}

pub fn capset_to_string(set: &CapSet) -> String {
    set.iter()
        .fold(String::new(), |mut acc, cap| {
            acc.push_str(&cap_name(cap));
            acc.push(' ');
            acc
        })
        .trim_end()
        .to_string()
}

/// capctl reports raw errno values, keep them as `Errno` so diagnostics carry the OS text
pub fn errno_of(err: capctl::Error) -> Errno {
    Errno::from_raw(err.code())
}

#[cfg(debug_assertions)]
pub fn subscribe(_tool: &str) {
    // stdout is handed over to the target command
    let _ = tracing_subscriber::fmt()
        .with_max_level(LOG_LEVEL)
        .with_file(true)
        .with_line_number(true)
        .with_writer(io::stderr)
        .finish()
        .try_init();
}

#[cfg(not(debug_assertions))]
pub fn subscribe(tool: &str) {
    use std::{ffi::CString, panic::set_hook};

    let syslog = CString::new(tool).ok().and_then(|identity| {
        syslog_tracing::Syslog::new(
            identity,
            syslog_tracing::Options::LOG_PID,
            syslog_tracing::Facility::Auth,
        )
    });
    let builder = tracing_subscriber::fmt()
        .compact()
        .with_max_level(LOG_LEVEL)
        .with_file(false)
        .with_line_number(false)
        .with_target(false)
        .without_time();
    let _ = match syslog {
        Some(syslog) => builder.with_writer(syslog).finish().try_init(),
        None => builder.with_writer(io::stderr).finish().try_init(),
    };
    set_hook(Box::new(|info| {
        if let Some(s) = info.payload().downcast_ref::<String>() {
            eprintln!("{}", s);
        }
    }));
}
