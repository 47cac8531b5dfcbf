//! Identifiers shared by the host and the VM

use std::fmt;

/// Opaque handle correlating one VM instance with its host-side state.
///
/// Allocated by the host's instance registry when a VM is created. The VM
/// keeps a copy for its whole lifetime and hands it back on every callback;
/// it never mutates or frees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct InstanceId(pub u64);

impl InstanceId {
    /// Raw integer value (what crosses the C ABI)
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vm#{}", self.0)
    }
}

/// Stable identifier of a host function registered inside one VM.
///
/// The Lua-side closure captures only this integer; the host function
/// itself stays in the VM's callable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CallableId(pub u32);

impl CallableId {
    /// Raw integer value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CallableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a callable was exposed to scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallableKind {
    /// Bound to a global name
    Global(String),
    /// Pushed as a plain value (table field, argument, return value)
    Anonymous,
}

impl CallableKind {
    /// Global name, if any
    pub fn name(&self) -> Option<&str> {
        match self {
            CallableKind::Global(name) => Some(name),
            CallableKind::Anonymous => None,
        }
    }
}
