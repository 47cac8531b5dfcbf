//! Function trampoline: routes calls of host callables from the VM to the
//! host function registered under the callable's id.
//!
//! Every host function bound into a VM gets a [`CallableId`]. The Lua-side
//! closure captures only that id; the host function itself lives in the
//! VM's [`CallableTable`] (stored as app data). On a call the trampoline
//! looks the id up, hands the host function a [`CallFrame`] over the
//! arguments, and returns the last `n` values the host function pushed.

use std::collections::HashMap;

use luabridge_sdk::{
    BridgeError, BridgeResult, CallableId, CallableKind, HostFn, HostFrame, HostValue, InstanceId,
};
use mlua::{Function, Lua, MultiValue, RegistryKey, Value};

use crate::config::ProjectionOptions;
use crate::convert::Projector;

struct CallableEntry {
    kind: CallableKind,
    func: HostFn,
    key: RegistryKey,
}

/// Per-VM table of host callables, indexed by [`CallableId`]
#[derive(Default)]
pub struct CallableTable {
    entries: Vec<CallableEntry>,
    by_pointer: HashMap<usize, CallableId>,
}

impl CallableTable {
    fn entry(&self, id: CallableId) -> Option<&CallableEntry> {
        let index = (id.as_u32() as usize).checked_sub(1)?;
        self.entries.get(index)
    }

    /// Id of the host callable behind a Lua function, if it is one
    pub fn lookup(&self, function: &Function) -> Option<CallableId> {
        self.by_pointer.get(&(function.to_pointer() as usize)).copied()
    }

    /// Registry key of the Lua function for `id`
    pub fn registry_key(&self, id: CallableId) -> Option<&RegistryKey> {
        self.entry(id).map(|entry| &entry.key)
    }

    /// How `id` was exposed
    pub fn kind(&self, id: CallableId) -> Option<&CallableKind> {
        self.entry(id).map(|entry| &entry.kind)
    }

    /// `(id, kind)` of every callable in registration order
    pub fn list(&self) -> Vec<(CallableId, CallableKind)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (CallableId(i as u32 + 1), entry.kind.clone()))
            .collect()
    }

    /// Number of registered callables
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no callable is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Register `func` with the VM and return its id and Lua function.
///
/// `CallableKind::Global` entries are also bound to their global name.
pub fn register(lua: &Lua, kind: CallableKind, func: HostFn) -> mlua::Result<(CallableId, Function)> {
    if lua.app_data_ref::<CallableTable>().is_none() {
        lua.set_app_data(CallableTable::default());
    }

    let id = {
        let table = lua
            .app_data_ref::<CallableTable>()
            .ok_or_else(|| mlua::Error::RuntimeError("callable table missing".into()))?;
        let next = u32::try_from(table.len() + 1)
            .map_err(|_| mlua::Error::RuntimeError("too many host callables".into()))?;
        CallableId(next)
    };

    let function = lua.create_function(move |lua, args: MultiValue| dispatch(lua, id, args))?;
    let key = lua.create_registry_value(function.clone())?;

    if let CallableKind::Global(name) = &kind {
        lua.globals().set(name.as_str(), function.clone())?;
    }

    let mut table = lua
        .app_data_mut::<CallableTable>()
        .ok_or_else(|| mlua::Error::RuntimeError("callable table missing".into()))?;
    table.by_pointer.insert(function.to_pointer() as usize, id);
    table.entries.push(CallableEntry { kind, func, key });

    tracing::trace!(callable = %id, "registered host callable");
    Ok((id, function))
}

/// Invoke callable `id` with `args` on behalf of the VM
pub fn dispatch(lua: &Lua, id: CallableId, args: MultiValue) -> mlua::Result<MultiValue> {
    // The borrow must end before the host function runs: it may register
    // further callables.
    let func = {
        let table = lua
            .app_data_ref::<CallableTable>()
            .ok_or_else(|| mlua::Error::RuntimeError("callable table missing".into()))?;
        match table.entry(id) {
            Some(entry) => entry.func.clone(),
            None => {
                return Err(mlua::Error::external(BridgeError::Message(format!(
                    "unknown host callable {}",
                    id
                ))))
            }
        }
    };

    let instance = lua
        .app_data_ref::<InstanceId>()
        .map(|id| *id)
        .unwrap_or(InstanceId(0));
    let projection = lua
        .app_data_ref::<ProjectionOptions>()
        .map(|options| *options)
        .unwrap_or_default();

    let mut frame = CallFrame {
        lua,
        instance,
        callable: id,
        args: args.into_iter().collect(),
        results: Vec::new(),
        projection,
    };

    let count = func(&mut frame).map_err(mlua::Error::external)?;
    tracing::trace!(instance = %instance, callable = %id, args = frame.args.len(), results = count, "host call");

    let values = frame.take_results(count).map_err(mlua::Error::external)?;
    Ok(MultiValue::from_vec(values))
}

/// The [`HostFrame`] a host function sees during one trampoline call
pub struct CallFrame<'a> {
    lua: &'a Lua,
    instance: InstanceId,
    callable: CallableId,
    args: Vec<Value>,
    results: Vec<HostValue>,
    projection: ProjectionOptions,
}

impl CallFrame<'_> {
    /// Raw VM argument `index`
    pub fn raw_arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    fn take_results(&mut self, count: usize) -> BridgeResult<Vec<Value>> {
        if count > self.results.len() {
            return Err(BridgeError::Message(format!(
                "host callable {} returned {} values but pushed {}",
                self.callable,
                count,
                self.results.len()
            )));
        }
        let projector = Projector::new(self.lua, self.projection);
        let start = self.results.len() - count;
        self.results[start..]
            .iter()
            .map(|value| projector.to_lua(value))
            .collect()
    }
}

impl HostFrame for CallFrame<'_> {
    fn instance(&self) -> InstanceId {
        self.instance
    }

    fn callable(&self) -> CallableId {
        self.callable
    }

    fn arg_count(&self) -> usize {
        self.args.len()
    }

    fn arg(&self, index: usize) -> BridgeResult<HostValue> {
        match self.args.get(index) {
            Some(value) => Projector::new(self.lua, self.projection).to_host(value),
            None => Ok(HostValue::Nil),
        }
    }

    fn push(&mut self, value: HostValue) {
        self.results.push(value);
    }

    fn pushed(&self) -> usize {
        self.results.len()
    }
}
