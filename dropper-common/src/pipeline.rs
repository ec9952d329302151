//! Bounding set drop, step by step.
//!
//! The snapshot is read, its inheritable set cleared, then copied as the baseline.
//! CAP_SETPCAP is raised on the snapshot and applied, the target capability leaves
//! the bounding set, and the baseline is applied back. The first failing step ends
//! the sequence. Both handles are released on every path.

use nix::errno::Errno;
use tracing::{debug, info, warn};

use crate::{
    capabilities::{CapFlag, CapHandle, CapabilityBackend},
    config::{BOUNDING_PRIVILEGE, DROPPED_CAPABILITY},
    error::{DropError, DropResult},
    util::cap_name,
};

/// Owns the snapshot and baseline handles until they are released
pub struct HandlePair<'a, B: CapabilityBackend> {
    backend: &'a mut B,
    snapshot: Option<CapHandle>,
    baseline: Option<CapHandle>,
}

impl<'a, B: CapabilityBackend> HandlePair<'a, B> {
    pub fn acquire(backend: &'a mut B) -> DropResult<Self> {
        let snapshot = backend.get_proc().map_err(DropError::CapabilityRead)?;
        debug!("acquired capability snapshot {:?}", snapshot);
        Ok(HandlePair {
            backend,
            snapshot: Some(snapshot),
            baseline: None,
        })
    }

    fn snapshot(&self) -> Result<CapHandle, Errno> {
        self.snapshot.ok_or(Errno::EINVAL)
    }

    fn clear_inheritable(&mut self) -> DropResult<()> {
        self.snapshot()
            .and_then(|snapshot| self.backend.clear_flag(snapshot, CapFlag::Inheritable))
            .map_err(|errno| DropError::mutate(format!("clear {}", CapFlag::Inheritable), errno))
    }

    fn capture_baseline(&mut self) -> DropResult<()> {
        let snapshot = self.snapshot().map_err(DropError::CapabilityDuplicate)?;
        let duplicate = self.backend.dup(snapshot);
        if let Ok(baseline) = duplicate {
            self.baseline = Some(baseline);
        }
        let both_live = self.backend.is_live(snapshot)
            && self
                .baseline
                .is_some_and(|baseline| self.backend.is_live(baseline));
        if !both_live {
            return Err(DropError::CapabilityDuplicate(
                duplicate.err().unwrap_or(Errno::EINVAL),
            ));
        }
        debug!("baseline capability state {:?}", self.baseline);
        Ok(())
    }

    fn elevate(&mut self) -> DropResult<()> {
        let snapshot = self.snapshot().map_err(|errno| {
            DropError::mutate(format!("select {}", cap_name(BOUNDING_PRIVILEGE)), errno)
        })?;
        self.backend
            .set_flag(snapshot, CapFlag::Effective, &[BOUNDING_PRIVILEGE], true)
            .map_err(|errno| {
                DropError::mutate(format!("select {}", cap_name(BOUNDING_PRIVILEGE)), errno)
            })?;
        self.backend.set_proc(snapshot).map_err(|errno| {
            DropError::mutate(format!("raise {}", cap_name(BOUNDING_PRIVILEGE)), errno)
        })?;
        debug!("{} is effective", cap_name(BOUNDING_PRIVILEGE));
        Ok(())
    }

    fn drop_target(&mut self) -> DropResult<()> {
        self.backend
            .drop_bound(DROPPED_CAPABILITY)
            .map_err(|errno| DropError::CapabilityBoundingDrop {
                cap: DROPPED_CAPABILITY,
                errno,
            })?;
        info!("{} dropped from the bounding set", cap_name(DROPPED_CAPABILITY));
        Ok(())
    }

    fn restore(&mut self) -> DropResult<()> {
        let baseline = self.baseline.ok_or(DropError::CapabilityRestore(Errno::EINVAL))?;
        self.backend
            .set_proc(baseline)
            .map_err(DropError::CapabilityRestore)?;
        debug!("{} lowered", cap_name(BOUNDING_PRIVILEGE));
        Ok(())
    }

    fn run(&mut self) -> DropResult<()> {
        self.clear_inheritable()?;
        self.capture_baseline()?;
        self.elevate()?;
        // on failure restore is skipped, the process exits without exec
        self.drop_target()?;
        self.restore()
    }

    /// Release both handles. Each held handle is attempted, the first failure is returned.
    pub fn release(mut self) -> DropResult<()> {
        self.release_all()
    }

    fn release_all(&mut self) -> DropResult<()> {
        let mut result = Ok(());
        for handle in [self.snapshot.take(), self.baseline.take()]
            .into_iter()
            .flatten()
        {
            if let Err(errno) = self.backend.free(handle) {
                warn!("failed to release {:?}: {}", handle, errno);
                if result.is_ok() {
                    result = Err(DropError::ResourceRelease(errno));
                }
            }
        }
        result
    }
}

impl<B: CapabilityBackend> Drop for HandlePair<'_, B> {
    fn drop(&mut self) {
        if let Err(err) = self.release_all() {
            warn!("{}", err);
        }
    }
}

/// Remove the dropped capability from the bounding set and return to the baseline state.
///
/// A failing step wins over a release failure that follows it. The release failure is
/// still reported on stderr where it happens.
pub fn drop_bounding_capability<B: CapabilityBackend>(
    backend: &mut B,
    program: &str,
) -> DropResult<()> {
    let mut handles = HandlePair::acquire(backend)?;
    match handles.run() {
        Ok(()) => handles.release(),
        Err(err) => {
            if let Err(release) = handles.release() {
                release.diagnose(program);
            }
            Err(err)
        }
    }
}
