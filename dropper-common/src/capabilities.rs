//! Capability state handles and the backends that serve them.
//!
//! A [`CapabilityBackend`] hands out [`CapHandle`]s on stored copies of a process
//! capability state. Handles are edited in memory, applied back onto the process,
//! and must be released once. The bounding set is not part of a stored state: it is
//! process wide and only ever shrinks through [`CapabilityBackend::drop_bound`].

use capctl::{Cap, CapSet, CapState};
use nix::errno::Errno;
use strum::{Display, EnumIs};
use tracing::{debug, trace};

use crate::util::{cap_name, capset_to_string, errno_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIs)]
pub enum CapFlag {
    #[strum(serialize = "CAP_EFFECTIVE")]
    Effective,
    #[strum(serialize = "CAP_PERMITTED")]
    Permitted,
    #[strum(serialize = "CAP_INHERITABLE")]
    Inheritable,
}

impl CapFlag {
    fn of(self, state: &mut CapState) -> &mut CapSet {
        match self {
            CapFlag::Effective => &mut state.effective,
            CapFlag::Permitted => &mut state.permitted,
            CapFlag::Inheritable => &mut state.inheritable,
        }
    }
}

/// Opaque reference to one stored capability state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapHandle(usize);

pub trait CapabilityBackend {
    /// Read the calling process capability state into a new handle
    fn get_proc(&mut self) -> Result<CapHandle, Errno>;
    /// Store a copy of the state behind `handle`
    fn dup(&mut self, handle: CapHandle) -> Result<CapHandle, Errno>;
    /// Whether `handle` still refers to a stored state
    fn is_live(&self, handle: CapHandle) -> bool;
    fn clear_flag(&mut self, handle: CapHandle, flag: CapFlag) -> Result<(), Errno>;
    fn set_flag(
        &mut self,
        handle: CapHandle,
        flag: CapFlag,
        caps: &[Cap],
        raise: bool,
    ) -> Result<(), Errno>;
    /// Apply the state behind `handle` onto the calling process
    fn set_proc(&mut self, handle: CapHandle) -> Result<(), Errno>;
    /// Remove `cap` from the process bounding set
    fn drop_bound(&mut self, cap: Cap) -> Result<(), Errno>;
    /// Release `handle`, it must not be used afterwards
    fn free(&mut self, handle: CapHandle) -> Result<(), Errno>;
}

/// Slot table shared by the backends, released slots stay empty so stale handles fail
#[derive(Debug, Default)]
struct StateTable {
    slots: Vec<Option<CapState>>,
}

impl StateTable {
    fn insert(&mut self, state: CapState) -> CapHandle {
        self.slots.push(Some(state));
        CapHandle(self.slots.len() - 1)
    }

    fn get(&self, handle: CapHandle) -> Result<&CapState, Errno> {
        self.slots
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or(Errno::EINVAL)
    }

    fn get_mut(&mut self, handle: CapHandle) -> Result<&mut CapState, Errno> {
        self.slots
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(Errno::EINVAL)
    }

    fn remove(&mut self, handle: CapHandle) -> Result<CapState, Errno> {
        self.slots
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or(Errno::EINVAL)
    }

    #[cfg(test)]
    fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn clear_flag(&mut self, handle: CapHandle, flag: CapFlag) -> Result<(), Errno> {
        flag.of(self.get_mut(handle)?).clear();
        Ok(())
    }

    fn set_flag(
        &mut self,
        handle: CapHandle,
        flag: CapFlag,
        caps: &[Cap],
        raise: bool,
    ) -> Result<(), Errno> {
        if caps.is_empty() {
            return Err(Errno::EINVAL);
        }
        let set = flag.of(self.get_mut(handle)?);
        for cap in caps {
            set.set_state(*cap, raise);
        }
        Ok(())
    }
}

fn describe(state: &CapState) -> String {
    format!(
        "e=[{}] p=[{}] i=[{}]",
        capset_to_string(&state.effective),
        capset_to_string(&state.permitted),
        capset_to_string(&state.inheritable)
    )
}

/// Backend talking to the running kernel through capctl
#[derive(Debug, Default)]
pub struct KernelCapabilities {
    table: StateTable,
}

impl KernelCapabilities {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CapabilityBackend for KernelCapabilities {
    fn get_proc(&mut self) -> Result<CapHandle, Errno> {
        let state = CapState::get_current().map_err(errno_of)?;
        debug!("current capabilities: {}", describe(&state));
        Ok(self.table.insert(state))
    }

    fn dup(&mut self, handle: CapHandle) -> Result<CapHandle, Errno> {
        let state = self.table.get(handle)?.clone();
        Ok(self.table.insert(state))
    }

    fn is_live(&self, handle: CapHandle) -> bool {
        self.table.get(handle).is_ok()
    }

    fn clear_flag(&mut self, handle: CapHandle, flag: CapFlag) -> Result<(), Errno> {
        self.table.clear_flag(handle, flag)
    }

    fn set_flag(
        &mut self,
        handle: CapHandle,
        flag: CapFlag,
        caps: &[Cap],
        raise: bool,
    ) -> Result<(), Errno> {
        self.table.set_flag(handle, flag, caps, raise)
    }

    fn set_proc(&mut self, handle: CapHandle) -> Result<(), Errno> {
        let state = self.table.get(handle)?;
        debug!("applying capabilities: {}", describe(state));
        state.set_current().map_err(errno_of)
    }

    fn drop_bound(&mut self, cap: Cap) -> Result<(), Errno> {
        trace!("dropping {} from the bounding set", cap_name(cap));
        capctl::bounding::drop(cap).map_err(errno_of)
    }

    fn free(&mut self, handle: CapHandle) -> Result<(), Errno> {
        self.table.remove(handle).map(|_| ())
    }
}
