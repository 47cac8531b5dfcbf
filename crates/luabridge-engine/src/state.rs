//! LuaState: one VM instance plus its host-side context
//!
//! A state is created by [`Bridge::new_state`](crate::Bridge::new_state),
//! which registers it with the bridge's instance registry. Dropping the
//! state removes the registration.

use std::sync::Arc;
use std::time::Duration;

use luabridge_sdk::{
    host_fn, BridgeError, BridgeResult, CallableId, CallableKind, HostFrame, HostFunctionRegistry,
    HostValue, InstanceId, SharedMap,
};
use mlua::{FromLuaMulti, Function, Lua, LuaOptions, MultiValue, StdLib, Table, Value};

use crate::classify::{classify, Classification};
use crate::config::{ProjectionOptions, StateOptions};
use crate::convert::Projector;
use crate::error::{Abort, VmError, VmResult};
use crate::registry::{AbortHandle, InstanceContext, InstanceRegistry};
use crate::table::TableRef;
use crate::trampoline::{self, CallableTable};
use crate::{builtins, hook, panic};

/// Name given to chunks run without an explicit one
const DEFAULT_CHUNK_NAME: &str = "chunk";

fn vm_error(err: mlua::Error) -> VmError {
    panic::translate(&err)
}

/// An embedded Lua VM registered with a [`Bridge`](crate::Bridge)
pub struct LuaState {
    lua: Lua,
    context: Arc<InstanceContext>,
    registry: Arc<InstanceRegistry>,
    projection: ProjectionOptions,
    shared_map: SharedMap,
}

impl LuaState {
    pub(crate) fn create(
        registry: Arc<InstanceRegistry>,
        functions: &HostFunctionRegistry,
        options: &StateOptions,
    ) -> VmResult<Self> {
        let libs = if options.open_libs {
            StdLib::ALL_SAFE
        } else {
            StdLib::NONE
        };
        let lua = Lua::new_with(libs, LuaOptions::new()).map_err(|e| VmError::Init(e.to_string()))?;

        let context = registry.register(options.step_limit, options.timeout);
        let shared_map = options
            .shared_map
            .clone()
            .unwrap_or_else(|| SharedMap::new(options.builtins.map_size_limit));

        // From here on Drop unregisters the instance if setup fails
        let state = LuaState {
            lua,
            context,
            registry,
            projection: options.projection,
            shared_map,
        };

        state.lua.set_app_data(state.context.id());
        state.lua.set_app_data(state.projection);
        state.lua.set_app_data(CallableTable::default());

        hook::install(&state.lua, Arc::clone(&state.registry), options.hook_granularity);

        for (name, func) in functions.iter() {
            trampoline::register(&state.lua, CallableKind::Global(name.to_string()), func.clone())
                .map_err(|e| VmError::Init(e.to_string()))?;
        }
        if options.builtins.any() {
            builtins::install(&state.lua, &options.builtins, &state.shared_map)
                .map_err(|e| VmError::Init(e.to_string()))?;
        }

        tracing::debug!(
            instance = %state.id(),
            step_limit = options.step_limit,
            timeout_ms = options.timeout.map(|t| t.as_millis() as u64),
            host_functions = functions.len(),
            "created Lua state"
        );
        Ok(state)
    }

    // ========================================================================
    // Instance
    // ========================================================================

    /// Instance handle
    pub fn id(&self) -> InstanceId {
        self.context.id()
    }

    /// Host-side context of this instance
    pub fn context(&self) -> &Arc<InstanceContext> {
        &self.context
    }

    /// Handle that cancels this instance from any thread
    pub fn abort_handle(&self) -> AbortHandle {
        self.context.abort_handle()
    }

    /// The underlying VM
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Map used by the map builtins
    pub fn shared_map(&self) -> &SharedMap {
        &self.shared_map
    }

    /// Open the memory-safe standard libraries
    pub fn open_libs(&self) -> VmResult<()> {
        self.lua
            .load_std_libs(StdLib::ALL_SAFE)
            .map_err(|e| VmError::Init(e.to_string()))
    }

    // ========================================================================
    // Limits and observers
    // ========================================================================

    /// Set the step limit (0 = unlimited) and reset the step counter
    pub fn set_limit(&self, limit: u64) {
        self.context.set_limit(limit);
    }

    /// Current step limit
    pub fn limit(&self) -> u64 {
        self.context.limit()
    }

    /// Steps counted since the last `set_limit`
    pub fn step(&self) -> u64 {
        self.context.step()
    }

    /// Overwrite the step counter
    pub fn set_step(&self, step: u64) {
        self.context.set_step(step);
    }

    /// Restart the deadline clock; `None` removes the deadline
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.context.set_timeout(timeout);
    }

    /// Observe every counted step
    pub fn on_step<F>(&self, observer: F)
    where
        F: Fn(InstanceId, u64) + Send + Sync + 'static,
    {
        self.context.set_step_observer(Some(Arc::new(observer)));
    }

    /// Observe errors that end a run
    pub fn on_panic<F>(&self, observer: F)
    where
        F: Fn(InstanceId, &str) + Send + Sync + 'static,
    {
        self.context.set_panic_observer(Some(Arc::new(observer)));
    }

    // ========================================================================
    // Running chunks
    // ========================================================================

    fn compile(&self, source: &str, name: &str) -> VmResult<Function> {
        self.lua
            .load(source)
            .set_name(format!("={}", name))
            .into_function()
            .map_err(|e| panic::relay_load(&self.context, e))
    }

    fn call<R: FromLuaMulti>(&self, function: &Function, args: MultiValue) -> VmResult<R> {
        self.context.check_runnable()?;

        let result: mlua::Result<R> = function.call(args);

        // An abort the script caught (pcall, coroutines) still ends the run
        if let Some(abort) = self.context.take_abort() {
            return Err(panic::relay_abort(&self.context, abort));
        }
        let value = result.map_err(|e| panic::relay(&self.context, e))?;

        // Cancelled while the last instructions ran between two hook calls
        if self.context.is_cancelled() {
            return Err(panic::relay_abort(&self.context, Abort::Cancelled));
        }
        Ok(value)
    }

    /// Compile `source` without running it
    pub fn check(&self, source: &str) -> VmResult<()> {
        self.check_named(source, DEFAULT_CHUNK_NAME)
    }

    /// [`check`](Self::check) under chunk name `name`
    pub fn check_named(&self, source: &str, name: &str) -> VmResult<()> {
        self.compile(source, name).map(|_| ())
    }

    /// Run `source`
    pub fn exec(&self, source: &str) -> VmResult<()> {
        self.exec_named(source, DEFAULT_CHUNK_NAME)
    }

    /// Run `source` under chunk name `name` (used in error messages)
    pub fn exec_named(&self, source: &str, name: &str) -> VmResult<()> {
        let function = self.compile(source, name)?;
        self.call::<()>(&function, MultiValue::new())
    }

    /// Run `source` and project its first return value
    pub fn eval(&self, source: &str) -> VmResult<HostValue> {
        self.eval_named(source, DEFAULT_CHUNK_NAME)
    }

    /// [`eval`](Self::eval) under chunk name `name`
    pub fn eval_named(&self, source: &str, name: &str) -> VmResult<HostValue> {
        let function = self.compile(source, name)?;
        let value: Value = self.call(&function, MultiValue::new())?;
        self.projector().to_host(&value).map_err(VmError::Projection)
    }

    /// Call global function `name` with `args` and project its first result
    pub fn call_global(&self, name: &str, args: &[HostValue]) -> VmResult<HostValue> {
        let global: Value = self.lua.globals().get(name).map_err(vm_error)?;
        let function = match global {
            Value::Function(function) => function,
            other => {
                return Err(VmError::Projection(BridgeError::type_mismatch(
                    "function",
                    other.type_name(),
                )))
            }
        };

        let projector = self.projector();
        let args = args
            .iter()
            .map(|arg| projector.to_lua(arg))
            .collect::<BridgeResult<Vec<_>>>()
            .map_err(VmError::Projection)?;

        let value: Value = self.call(&function, MultiValue::from_vec(args))?;
        projector.to_host(&value).map_err(VmError::Projection)
    }

    // ========================================================================
    // Host functions
    // ========================================================================

    /// Bind a host function to global `name`
    pub fn set_func<F>(&self, name: &str, func: F) -> VmResult<CallableId>
    where
        F: Fn(&mut dyn HostFrame) -> BridgeResult<usize> + Send + Sync + 'static,
    {
        let (id, _) = trampoline::register(&self.lua, CallableKind::Global(name.to_string()), host_fn(func))
            .map_err(vm_error)?;
        tracing::debug!(instance = %self.id(), callable = %id, "bound host function {}", name);
        Ok(id)
    }

    /// Register an anonymous host function.
    ///
    /// The returned id crosses into the VM as `HostValue::Callable`.
    pub fn push_func<F>(&self, func: F) -> VmResult<CallableId>
    where
        F: Fn(&mut dyn HostFrame) -> BridgeResult<usize> + Send + Sync + 'static,
    {
        let (id, _) = trampoline::register(&self.lua, CallableKind::Anonymous, host_fn(func))
            .map_err(vm_error)?;
        Ok(id)
    }

    /// `(id, kind)` of every host callable registered with this VM
    pub fn callables(&self) -> Vec<(CallableId, CallableKind)> {
        self.lua
            .app_data_ref::<CallableTable>()
            .map(|table| table.list())
            .unwrap_or_default()
    }

    // ========================================================================
    // Globals and tables
    // ========================================================================

    fn projector(&self) -> Projector<'_> {
        Projector::new(&self.lua, self.projection)
    }

    /// Set global `name`
    pub fn set_global(&self, name: &str, value: &HostValue) -> VmResult<()> {
        let value = self.projector().to_lua(value).map_err(VmError::Projection)?;
        self.lua.globals().set(name, value).map_err(vm_error)
    }

    /// Read global `name`
    pub fn get_global(&self, name: &str) -> VmResult<HostValue> {
        let value: Value = self.lua.globals().get(name).map_err(vm_error)?;
        self.projector().to_host(&value).map_err(VmError::Projection)
    }

    /// Classify global `name` (non-tables classify as `(false, 0)`)
    pub fn classify_global(&self, name: &str) -> VmResult<Classification> {
        let value: Value = self.lua.globals().get(name).map_err(vm_error)?;
        Ok(classify(&value))
    }

    /// View of the table in global `name`
    pub fn table(&self, name: &str) -> VmResult<TableRef<'_>> {
        let global: Value = self.lua.globals().get(name).map_err(vm_error)?;
        match global {
            Value::Table(table) => Ok(TableRef::new(&self.lua, table, self.projection)),
            other => Err(VmError::Projection(BridgeError::type_mismatch(
                "table",
                other.type_name(),
            ))),
        }
    }

    /// Create an empty, unbound table
    pub fn new_table(&self) -> VmResult<TableRef<'_>> {
        let table: Table = self.lua.create_table().map_err(vm_error)?;
        Ok(TableRef::new(&self.lua, table, self.projection))
    }
}

impl std::fmt::Debug for LuaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaState")
            .field("context", &self.context)
            .field("projection", &self.projection)
            .finish()
    }
}

impl Drop for LuaState {
    fn drop(&mut self) {
        self.registry.remove(self.context.id());
        tracing::debug!(instance = %self.context.id(), steps = self.context.step(), "closed Lua state");
    }
}
