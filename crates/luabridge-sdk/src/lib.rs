//! luabridge SDK - Lightweight SDK for writing host functions
//!
//! This crate provides the minimal types and traits needed to write host
//! functions for embedded Lua without depending on the VM itself.
//!
//! # Example
//!
//! ```ignore
//! use luabridge_sdk::{HostFrame, HostFunctionRegistry, HostValue};
//!
//! let mut registry = HostFunctionRegistry::new();
//! registry.register("add", |frame: &mut dyn HostFrame| {
//!     let a = frame.int_arg(0)?;
//!     let b = frame.int_arg(1)?;
//!     frame.push(HostValue::Int(a + b));
//!     Ok(1)
//! });
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod handler;
pub mod map;
pub mod types;
pub mod value;

pub use context::HostFrame;
pub use error::{BridgeError, BridgeResult};
pub use handler::{host_fn, HostFn, HostFunctionRegistry};
pub use map::{SharedMap, DEFAULT_MAP_SIZE_LIMIT};
pub use types::{CallableId, CallableKind, InstanceId};
pub use value::{HostKey, HostValue};
