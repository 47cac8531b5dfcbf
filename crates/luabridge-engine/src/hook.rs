//! Step hook: the VM reports execution progress, the host decides whether
//! it may continue.

use std::sync::Arc;

use luabridge_sdk::InstanceId;
use mlua::{HookTriggers, Lua, VmState};

use crate::registry::InstanceRegistry;

/// Install the step hook on `lua`.
///
/// The hook fires every `granularity` VM instructions (0 is treated as 1).
/// It looks the instance up by the [`InstanceId`] stored in the VM's app
/// data; a VM with no registered context runs unchecked. An abort from the
/// context is raised into the VM as an error carrying the [`Abort`].
///
/// [`Abort`]: crate::error::Abort
pub fn install(lua: &Lua, registry: Arc<InstanceRegistry>, granularity: u32) {
    let triggers = HookTriggers::new().every_nth_instruction(granularity.max(1));

    lua.set_hook(triggers, move |lua, _debug| {
        let Some(id) = lua.app_data_ref::<InstanceId>().map(|id| *id) else {
            return Ok(VmState::Continue);
        };
        let Some(context) = registry.get(id) else {
            return Ok(VmState::Continue);
        };

        match context.on_step() {
            Ok(()) => Ok(VmState::Continue),
            Err(abort) => {
                tracing::trace!(instance = %id, step = context.step(), "step hook abort: {}", abort);
                Err(mlua::Error::external(abort))
            }
        }
    });
}
