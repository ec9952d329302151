mod command;

use std::{
    env,
    process::{ExitCode, Termination},
};

use dropper_common::{
    capabilities::KernelCapabilities, config::SYSLOG_IDENTITY, launcher::launch,
    util::subscribe,
};
use tracing::debug;

fn main() -> ExitCode {
    subscribe(SYSLOG_IDENTITY);
    let args = env::args_os().collect::<Vec<_>>();
    let program = args
        .first()
        .map(|arg0| arg0.to_string_lossy().into_owned())
        .unwrap_or_else(|| SYSLOG_IDENTITY.to_string());
    let mut backend = KernelCapabilities::new();
    let err = match launch(args, &mut backend, command::replace_image) {
        Ok(never) => match never {},
        Err(err) => err,
    };
    err.diagnose(&program);
    debug!("exiting with status {}", err.status());
    err.report()
}
