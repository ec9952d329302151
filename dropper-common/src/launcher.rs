use std::{
    convert::Infallible,
    ffi::{CStr, CString, OsString},
    os::unix::ffi::OsStringExt,
};

use nix::errno::Errno;
use tracing::{debug, info};

use crate::{
    capabilities::CapabilityBackend,
    config::SYSLOG_IDENTITY,
    error::{DropError, DropResult},
    pipeline::drop_bounding_capability,
};

/// The launcher name and the argument vector handed to the target command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    argv: Vec<CString>,
}

impl Invocation {
    /// Split `args` (as read from the process, name first). Everything after the
    /// launcher name is kept verbatim.
    pub fn parse<I, S>(args: I) -> DropResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut args = args.into_iter().map(Into::into);
        let program = args
            .next()
            .map(|arg0| arg0.to_string_lossy().into_owned())
            .unwrap_or_else(|| SYSLOG_IDENTITY.to_string());
        let argv = args
            .map(|arg| CString::new(arg.into_vec()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| DropError::Usage {
                program: program.clone(),
            })?;
        if argv.is_empty() {
            return Err(DropError::Usage { program });
        }
        Ok(Invocation { program, argv })
    }

    pub fn command(&self) -> &CStr {
        &self.argv[0]
    }

    pub fn argv(&self) -> &[CString] {
        &self.argv
    }
}

/// Drop the capability then hand the process over through `replace`.
///
/// `replace` only comes back when process replacement failed, with the reason.
pub fn launch<B, R>(args: Vec<OsString>, backend: &mut B, replace: R) -> DropResult<Infallible>
where
    B: CapabilityBackend,
    R: FnOnce(&CStr, &[CString]) -> Errno,
{
    let invocation = Invocation::parse(args)?;
    debug!("invocation: {:?}", invocation);
    drop_bounding_capability(backend, &invocation.program)?;
    // every capability step succeeded
    let status = 0;
    info!("executing {}", invocation.command().to_string_lossy());
    let errno = replace(invocation.command(), invocation.argv());
    Err(DropError::Exec {
        command: invocation.command().to_string_lossy().into_owned(),
        errno,
        status,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use capctl::Cap;

    use super::*;
    use crate::capabilities::mock::{MockCapabilities, Op};
    use crate::error::{CAPABILITY_FAILURE, USAGE_FAILURE};
    use test_log::test;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_parse_keeps_arguments_verbatim() {
        let invocation =
            Invocation::parse(["drop_net_admin", "ls", "-la", "--", "a b"]).expect("Failed to parse");
        assert_eq!(invocation.program, "drop_net_admin");
        assert_eq!(invocation.command(), CString::new("ls").unwrap().as_c_str());
        assert_eq!(
            invocation.argv(),
            &[
                CString::new("ls").unwrap(),
                CString::new("-la").unwrap(),
                CString::new("--").unwrap(),
                CString::new("a b").unwrap(),
            ]
        );
    }

    #[test]
    fn test_parse_without_command() {
        assert_eq!(
            Invocation::parse(["drop_net_admin"]),
            Err(DropError::Usage {
                program: "drop_net_admin".into()
            })
        );
        assert_eq!(
            Invocation::parse(Vec::<OsString>::new()),
            Err(DropError::Usage {
                program: SYSLOG_IDENTITY.into()
            })
        );
    }

    #[test]
    fn test_usage_touches_no_capability() {
        let mut backend = MockCapabilities::root();
        let replaced = RefCell::new(false);
        let err = launch(args(&["drop_net_admin"]), &mut backend, |_, _| {
            *replaced.borrow_mut() = true;
            Errno::ENOENT
        })
        .unwrap_err();
        assert_eq!(err.status(), USAGE_FAILURE);
        assert!(backend.calls.is_empty());
        assert!(!*replaced.borrow());
    }

    #[test]
    fn test_replacement_receives_command() {
        let mut backend = MockCapabilities::permitted_setpcap();
        let seen = RefCell::new(Vec::new());
        let err = launch(args(&["drop_net_admin", "id", "-u"]), &mut backend, |cmd, argv| {
            seen.borrow_mut().push(cmd.to_owned());
            seen.borrow_mut().extend(argv.iter().cloned());
            Errno::ENOENT
        })
        .unwrap_err();
        assert_eq!(
            *seen.borrow(),
            vec![
                CString::new("id").unwrap(),
                CString::new("id").unwrap(),
                CString::new("-u").unwrap(),
            ]
        );
        assert!(err.is_exec());
        // nothing runs after replacement, the state below is what the command inherits
        assert!(!backend.bounding.has(Cap::NET_ADMIN));
        assert!(!backend.process.effective.has(Cap::SETPCAP));
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn test_missing_command_reports_exec_error() {
        let mut backend = MockCapabilities::root();
        let err = launch(
            args(&["drop_net_admin", "/nonexistent-binary-xyz"]),
            &mut backend,
            |_, _| Errno::ENOENT,
        )
        .unwrap_err();
        assert_eq!(
            err,
            DropError::Exec {
                command: "/nonexistent-binary-xyz".into(),
                errno: Errno::ENOENT,
                status: 0
            }
        );
        assert_eq!(err.status(), 0);
        assert!(!backend.bounding.has(Cap::NET_ADMIN));
    }

    #[test]
    fn test_failed_drop_never_replaces() {
        let mut backend = MockCapabilities::root().fail(Op::DropBound, 0, Errno::EPERM);
        let replaced = RefCell::new(false);
        let err = launch(args(&["drop_net_admin", "id"]), &mut backend, |_, _| {
            *replaced.borrow_mut() = true;
            Errno::ENOENT
        })
        .unwrap_err();
        assert!(!*replaced.borrow());
        assert_eq!(err.status(), CAPABILITY_FAILURE);
        assert_eq!(backend.live_handles(), 0);
    }
}
