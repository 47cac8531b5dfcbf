//! Host function type and the name-based registry used to install
//! bundles of host functions into new VM instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::HostFrame;
use crate::error::BridgeResult;

/// A host function callable from Lua.
///
/// Returns the number of values it pushed onto the frame that the VM
/// should claim as return values.
pub type HostFn = Arc<dyn Fn(&mut dyn HostFrame) -> BridgeResult<usize> + Send + Sync>;

/// Wrap a closure as a [`HostFn`]
pub fn host_fn<F>(f: F) -> HostFn
where
    F: Fn(&mut dyn HostFrame) -> BridgeResult<usize> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Registry of host functions indexed by global name.
///
/// Every function in the registry is bound as a global of each VM
/// instance created with it. Iteration order is by name, so installation
/// order (and therefore callable ids) is deterministic.
#[derive(Clone, Default)]
pub struct HostFunctionRegistry {
    handlers: BTreeMap<String, HostFn>,
}

impl HostFunctionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register a host function by global name, replacing any previous one
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&mut dyn HostFrame) -> BridgeResult<usize> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Arc::new(handler));
    }

    /// Get a handler by name
    pub fn get(&self, name: &str) -> Option<HostFn> {
        self.handlers.get(name).cloned()
    }

    /// Check if a handler is registered
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Iterate over `(name, handler)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostFn)> {
        self.handlers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Get the number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HostFunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunctionRegistry")
            .field("names", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
