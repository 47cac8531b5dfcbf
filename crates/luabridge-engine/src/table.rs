//! Host-side view of a Lua table
//!
//! Positional access is only allowed on tables the classifier accepts as
//! arrays, and only within `1..=len`.

use luabridge_sdk::{BridgeError, BridgeResult, HostKey, HostValue};
use mlua::{Lua, Table, Value};

use crate::classify::{classify_table, Classification};
use crate::config::ProjectionOptions;
use crate::convert::{project_key, Projector};

fn vm_error(err: mlua::Error) -> BridgeError {
    BridgeError::TableError(err.to_string())
}

/// A Lua table borrowed from one VM
pub struct TableRef<'a> {
    lua: &'a Lua,
    table: Table,
    projection: ProjectionOptions,
}

impl<'a> TableRef<'a> {
    /// Wrap `table`, which must belong to `lua`
    pub fn new(lua: &'a Lua, table: Table, projection: ProjectionOptions) -> Self {
        Self {
            lua,
            table,
            projection,
        }
    }

    fn projector(&self) -> Projector<'a> {
        Projector::new(self.lua, self.projection)
    }

    /// Classify the table's current contents
    pub fn classification(&self) -> Classification {
        classify_table(&self.table)
    }

    /// Whether the table is an array
    pub fn is_array(&self) -> bool {
        self.classification().is_array
    }

    /// Length of the array part as seen by the `#` operator
    pub fn raw_len(&self) -> usize {
        self.table.raw_len()
    }

    fn checked_index(&self, index: i64) -> BridgeResult<()> {
        let classification = self.classification();
        if !classification.is_array {
            return Err(BridgeError::TableError("table is not an array".into()));
        }
        if index < 1 || index as usize > classification.len {
            return Err(BridgeError::TableError(format!(
                "Index out of bounds: {} not in 1..={}",
                index, classification.len
            )));
        }
        Ok(())
    }

    /// Element `index` (1-based) of an array table
    pub fn get_index(&self, index: i64) -> BridgeResult<HostValue> {
        self.checked_index(index)?;
        let value: Value = self.table.raw_get(index).map_err(vm_error)?;
        self.projector().to_host(&value)
    }

    /// Overwrite element `index` (1-based) of an array table
    pub fn set_index(&self, index: i64, value: &HostValue) -> BridgeResult<()> {
        self.checked_index(index)?;
        let value = self.projector().to_lua(value)?;
        self.table.raw_set(index, value).map_err(vm_error)
    }

    /// Append to an array table; returns the new length
    pub fn append(&self, value: &HostValue) -> BridgeResult<usize> {
        let classification = self.classification();
        if !classification.is_array {
            return Err(BridgeError::TableError("cannot append to a non-array table".into()));
        }
        if value.is_nil() {
            return Err(BridgeError::TableError("cannot append nil".into()));
        }
        let len = classification.len + 1;
        let value = self.projector().to_lua(value)?;
        self.table.raw_set(len as i64, value).map_err(vm_error)?;
        Ok(len)
    }

    /// Field `key`
    pub fn get_field(&self, key: &str) -> BridgeResult<HostValue> {
        let value: Value = self.table.raw_get(key).map_err(vm_error)?;
        self.projector().to_host(&value)
    }

    /// Set field `key` (`Nil` removes it)
    pub fn set_field(&self, key: &str, value: &HostValue) -> BridgeResult<()> {
        let value = self.projector().to_lua(value)?;
        self.table.raw_set(key, value).map_err(vm_error)
    }

    /// Visit every entry until `f` returns `false`.
    ///
    /// Arrays are visited in index order, other tables in VM order.
    pub fn for_each<F>(&self, mut f: F) -> BridgeResult<()>
    where
        F: FnMut(HostKey, HostValue) -> bool,
    {
        let projector = self.projector();
        let classification = self.classification();

        if classification.is_array {
            for index in 1..=classification.len as i64 {
                let value: Value = self.table.raw_get(index).map_err(vm_error)?;
                if !f(HostKey::Int(index), projector.to_host(&value)?) {
                    break;
                }
            }
            return Ok(());
        }

        for pair in self.table.clone().pairs::<Value, Value>() {
            let (key, value) = pair.map_err(vm_error)?;
            if !f(project_key(&key)?, projector.to_host(&value)?) {
                break;
            }
        }
        Ok(())
    }

    /// Project the whole table
    pub fn to_host(&self) -> BridgeResult<HostValue> {
        self.projector().to_host(&Value::Table(self.table.clone()))
    }

    /// Underlying Lua table
    pub fn inner(&self) -> &Table {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_ref<'a>(lua: &'a Lua, src: &str) -> TableRef<'a> {
        let table: Table = lua.load(src).eval().unwrap();
        TableRef::new(lua, table, ProjectionOptions::default())
    }

    #[test]
    fn test_index_bounds() {
        let lua = Lua::new();
        let t = table_ref(&lua, "return {'a', 'b'}");

        assert_eq!(t.get_index(1).unwrap(), HostValue::from("a"));
        assert_eq!(t.get_index(2).unwrap(), HostValue::from("b"));
        assert!(t.get_index(0).is_err());
        assert!(t.get_index(3).is_err());
    }

    #[test]
    fn test_positional_access_needs_array() {
        let lua = Lua::new();
        let t = table_ref(&lua, "return {1, 2, x = 3}");
        assert!(!t.is_array());
        assert!(t.get_index(1).is_err());
        assert!(t.append(&HostValue::Int(4)).is_err());
        assert_eq!(t.get_field("x").unwrap(), HostValue::Int(3));
    }

    #[test]
    fn test_append_and_set() {
        let lua = Lua::new();
        let t = table_ref(&lua, "return {}");

        assert_eq!(t.append(&HostValue::Int(1)).unwrap(), 1);
        assert_eq!(t.append(&HostValue::Int(2)).unwrap(), 2);
        t.set_index(1, &HostValue::from("one")).unwrap();

        assert_eq!(t.classification().as_tuple(), (true, 2));
        assert_eq!(t.raw_len(), 2);
        assert_eq!(
            t.to_host().unwrap(),
            HostValue::Array(vec![HostValue::from("one"), HostValue::Int(2)])
        );
        assert!(t.append(&HostValue::Nil).is_err());
    }

    #[test]
    fn test_fields() {
        let lua = Lua::new();
        let t = table_ref(&lua, "return {}");
        t.set_field("name", &HostValue::from("x")).unwrap();
        assert_eq!(t.get_field("name").unwrap(), HostValue::from("x"));
        assert_eq!(t.get_field("missing").unwrap(), HostValue::Nil);

        t.set_field("name", &HostValue::Nil).unwrap();
        assert_eq!(t.classification().as_tuple(), (true, 0));
    }

    #[test]
    fn test_for_each_array_order_and_stop() {
        let lua = Lua::new();
        let t = table_ref(&lua, "return {10, 20, 30}");

        let mut seen = Vec::new();
        t.for_each(|key, value| {
            seen.push((key, value));
            seen.len() < 2
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![(HostKey::Int(1), HostValue::Int(10)), (HostKey::Int(2), HostValue::Int(20))]
        );
    }

    #[test]
    fn test_for_each_map() {
        let lua = Lua::new();
        let t = table_ref(&lua, "return {a = 1, b = 2}");
        let mut keys = Vec::new();
        t.for_each(|key, _| {
            keys.push(key);
            true
        })
        .unwrap();
        keys.sort();
        assert_eq!(keys, vec![HostKey::from("a"), HostKey::from("b")]);
    }
}
