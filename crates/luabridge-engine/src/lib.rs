//! luabridge engine - the host side of an embedded Lua VM
//!
//! The engine relays three kinds of events across the VM boundary:
//!
//! - **Steps**: a hook counts VM instructions and aborts runs that exceed
//!   their step budget, pass their deadline or are cancelled.
//! - **Errors**: errors unwinding out of the VM are translated into typed
//!   [`VmError`]s and reported to the instance's panic observer.
//! - **Calls**: host functions are bound into the VM by [`CallableId`];
//!   a trampoline routes each call to the registered host function.
//!
//! Values crossing the boundary are projected to [`HostValue`]s. Tables are
//! classified as arrays (keys exactly `1..=n`) or maps by [`classify`].
//!
//! # Example
//!
//! ```ignore
//! use luabridge_engine::{Bridge, StateOptions};
//!
//! let bridge = Bridge::new();
//! let state = bridge.new_state(&StateOptions::default().with_step_limit(10_000))?;
//! let value = state.eval("return {1, 2, 3}")?;
//! ```
//!
//! [`CallableId`]: luabridge_sdk::CallableId
//! [`HostValue`]: luabridge_sdk::HostValue

#![warn(missing_docs)]

pub mod bridge;
pub mod builtins;
pub mod classify;
pub mod config;
pub mod convert;
pub mod error;
pub mod hook;
pub mod panic;
pub mod registry;
pub mod state;
pub mod table;
pub mod trampoline;

pub use bridge::Bridge;
pub use classify::{classify, classify_keys, classify_table, Classification, KeyKind};
pub use config::{
    BridgeConfig, BuiltinsConfig, EmptyTablePolicy, LibsConfig, LimitsConfig, ProjectionOptions,
    StateOptions,
};
pub use error::{Abort, ConfigError, VmError, VmResult};
pub use registry::{AbortHandle, InstanceContext, InstanceRegistry, PanicObserver, StepObserver};
pub use state::LuaState;
pub use table::TableRef;

// Re-export the SDK so hosts need only one dependency
pub use luabridge_sdk;
pub use luabridge_sdk::{
    BridgeError, BridgeResult, CallableId, CallableKind, HostFrame, HostFunctionRegistry, HostKey,
    HostValue, InstanceId, SharedMap,
};
