//! Value projection between Lua values and [`HostValue`]s
//!
//! Tables are routed through the classifier: arrays become
//! `HostValue::Array`, everything else `HostValue::Map`. Map keys must be
//! integers (integral floats count) or strings. Lua functions cross only
//! when they are host callables registered with the same VM.

use std::collections::BTreeMap;

use luabridge_sdk::{BridgeError, BridgeResult, HostKey, HostValue};
use mlua::{Function, Lua, Table, Value};

use crate::classify::classify_table;
use crate::config::{EmptyTablePolicy, ProjectionOptions};
use crate::trampoline::CallableTable;

fn vm_error(err: mlua::Error) -> BridgeError {
    BridgeError::TableError(err.to_string())
}

/// Converts values of one VM
#[derive(Clone, Copy)]
pub struct Projector<'a> {
    lua: &'a Lua,
    options: ProjectionOptions,
}

impl<'a> Projector<'a> {
    /// Create a projector for `lua`
    pub fn new(lua: &'a Lua, options: ProjectionOptions) -> Self {
        Self { lua, options }
    }

    /// Project a Lua value to the host
    pub fn to_host(&self, value: &Value) -> BridgeResult<HostValue> {
        self.project(value, 0)
    }

    fn project(&self, value: &Value, depth: usize) -> BridgeResult<HostValue> {
        match value {
            Value::Nil => Ok(HostValue::Nil),
            Value::Boolean(b) => Ok(HostValue::Bool(*b)),
            Value::Integer(i) => Ok(HostValue::Int(*i)),
            Value::Number(n) => Ok(HostValue::Float(*n)),
            Value::String(s) => Ok(HostValue::Str(s.to_string_lossy().to_string())),
            Value::Table(table) => self.project_table(table, depth),
            Value::Function(function) => self.project_function(function),
            other => Err(BridgeError::type_mismatch("projectable value", other.type_name())),
        }
    }

    fn project_table(&self, table: &Table, depth: usize) -> BridgeResult<HostValue> {
        if depth >= self.options.max_depth {
            return Err(BridgeError::NestingTooDeep(self.options.max_depth));
        }

        let classification = classify_table(table);
        if classification.is_array {
            if classification.len == 0 && self.options.empty_table == EmptyTablePolicy::Map {
                return Ok(HostValue::Map(BTreeMap::new()));
            }
            let mut items = Vec::with_capacity(classification.len);
            for index in 1..=classification.len as i64 {
                let item: Value = table.raw_get(index).map_err(vm_error)?;
                items.push(self.project(&item, depth + 1)?);
            }
            return Ok(HostValue::Array(items));
        }

        let mut map = BTreeMap::new();
        let table = table.clone();
        for pair in table.pairs::<Value, Value>() {
            let (key, item) = pair.map_err(vm_error)?;
            map.insert(project_key(&key)?, self.project(&item, depth + 1)?);
        }
        Ok(HostValue::Map(map))
    }

    fn project_function(&self, function: &Function) -> BridgeResult<HostValue> {
        let id = self
            .lua
            .app_data_ref::<CallableTable>()
            .and_then(|table| table.lookup(function));
        match id {
            Some(id) => Ok(HostValue::Callable(id)),
            None => Err(BridgeError::type_mismatch("host callable", "Lua function")),
        }
    }

    /// Build the Lua value for a host value.
    ///
    /// `Nil` items inside an array are refused: they would leave holes
    /// and the table would no longer classify as an array.
    pub fn to_lua(&self, value: &HostValue) -> BridgeResult<Value> {
        let lua = self.lua;
        match value {
            HostValue::Nil => Ok(Value::Nil),
            HostValue::Bool(b) => Ok(Value::Boolean(*b)),
            HostValue::Int(i) => Ok(Value::Integer(*i)),
            HostValue::Float(n) => Ok(Value::Number(*n)),
            HostValue::Str(s) => Ok(Value::String(lua.create_string(s).map_err(vm_error)?)),
            HostValue::Array(items) => {
                let table = lua.create_table().map_err(vm_error)?;
                for (i, item) in items.iter().enumerate() {
                    if item.is_nil() {
                        return Err(BridgeError::TableError(format!(
                            "nil item at array index {}",
                            i + 1
                        )));
                    }
                    table
                        .raw_set(i as i64 + 1, self.to_lua(item)?)
                        .map_err(vm_error)?;
                }
                Ok(Value::Table(table))
            }
            HostValue::Map(entries) => {
                let table = lua.create_table().map_err(vm_error)?;
                for (key, item) in entries {
                    let key = match key {
                        HostKey::Int(i) => Value::Integer(*i),
                        HostKey::Str(s) => Value::String(lua.create_string(s).map_err(vm_error)?),
                    };
                    table.raw_set(key, self.to_lua(item)?).map_err(vm_error)?;
                }
                Ok(Value::Table(table))
            }
            HostValue::Callable(id) => {
                let function = {
                    let table = lua.app_data_ref::<CallableTable>();
                    let key = table.as_ref().and_then(|table| table.registry_key(*id));
                    match key {
                        Some(key) => lua.registry_value::<Function>(key).map_err(vm_error)?,
                        None => {
                            return Err(BridgeError::Message(format!("unknown host callable {}", id)))
                        }
                    }
                };
                Ok(Value::Function(function))
            }
        }
    }
}

/// Project a table key
pub fn project_key(key: &Value) -> BridgeResult<HostKey> {
    match key {
        Value::Integer(i) => Ok(HostKey::Int(*i)),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 2f64.powi(63) => Ok(HostKey::Int(*n as i64)),
        Value::String(s) => Ok(HostKey::Str(s.to_string_lossy().to_string())),
        Value::Number(n) => Err(BridgeError::UnsupportedKey(n.to_string())),
        other => Err(BridgeError::UnsupportedKey(other.type_name().to_string())),
    }
}
