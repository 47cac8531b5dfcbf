//! Bridge: owns the instance registry and the host functions installed
//! into every VM it creates.

use std::sync::Arc;

use luabridge_sdk::{BridgeResult, HostFrame, HostFunctionRegistry};

use crate::config::{BridgeConfig, StateOptions};
use crate::error::VmResult;
use crate::registry::InstanceRegistry;
use crate::state::LuaState;

/// Factory for [`LuaState`]s sharing one instance registry
#[derive(Debug, Default)]
pub struct Bridge {
    registry: Arc<InstanceRegistry>,
    functions: HostFunctionRegistry,
}

impl Bridge {
    /// Create a bridge with no host functions
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bridge that installs `functions` into every new VM
    pub fn with_functions(functions: HostFunctionRegistry) -> Self {
        Self {
            registry: Arc::new(InstanceRegistry::new()),
            functions,
        }
    }

    /// Instance registry of this bridge
    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Host functions installed into new VMs
    pub fn functions(&self) -> &HostFunctionRegistry {
        &self.functions
    }

    /// Register a host function for VMs created from now on
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&mut dyn HostFrame) -> BridgeResult<usize> + Send + Sync + 'static,
    {
        self.functions.register(name, handler);
    }

    /// Create and register a new VM instance
    pub fn new_state(&self, options: &StateOptions) -> VmResult<LuaState> {
        LuaState::create(Arc::clone(&self.registry), &self.functions, options)
    }

    /// Create a VM instance configured by `config`
    pub fn state_from_config(&self, config: &BridgeConfig) -> VmResult<LuaState> {
        self.new_state(&StateOptions::from(config))
    }
}
