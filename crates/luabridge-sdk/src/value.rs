//! HostValue — a Lua value projected to the host side of the boundary
//!
//! Scalars map one-to-one. Tables become either `Array` (keys exactly
//! `1..=n`) or `Map` (integer and string keys), as decided by the
//! engine's classifier. Functions only cross the boundary when they are
//! host callables registered with the VM.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::types::CallableId;

/// Key of a projected map
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostKey {
    /// Integer key
    Int(i64),
    /// String key
    Str(String),
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKey::Int(i) => write!(f, "{}", i),
            HostKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for HostKey {
    fn from(i: i64) -> Self {
        HostKey::Int(i)
    }
}

impl From<&str> for HostKey {
    fn from(s: &str) -> Self {
        HostKey::Str(s.to_string())
    }
}

impl From<String> for HostKey {
    fn from(s: String) -> Self {
        HostKey::Str(s)
    }
}

impl Serialize for HostKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HostKey::Int(i) => serializer.serialize_i64(*i),
            HostKey::Str(s) => serializer.serialize_str(s),
        }
    }
}

/// A value that has crossed from the VM to the host (or is about to cross back)
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    /// `nil`
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// Integer subtype of Lua numbers
    Int(i64),
    /// Float subtype of Lua numbers
    Float(f64),
    /// String (non-UTF-8 bytes are replaced lossily)
    Str(String),
    /// Dense table with keys `1..=len`
    Array(Vec<HostValue>),
    /// Any other table
    Map(BTreeMap<HostKey, HostValue>),
    /// Host function registered with the VM
    Callable(CallableId),
}

impl HostValue {
    /// Name of the value's type, as Lua's `type()` would report it
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Bool(_) => "boolean",
            HostValue::Int(_) | HostValue::Float(_) => "number",
            HostValue::Str(_) => "string",
            HostValue::Array(_) | HostValue::Map(_) => "table",
            HostValue::Callable(_) => "function",
        }
    }

    /// Check if this is nil
    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    /// Get as bool if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an integer, or a float with an exact integer value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            HostValue::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                let i = *f as i64;
                (i as f64 == *f).then_some(i)
            }
            _ => None,
        }
    }

    /// Get as f64 if this is a number
    pub fn as_float(&self) -> Option<f64> {
        match self {
            HostValue::Int(i) => Some(*i as f64),
            HostValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as &str if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the elements if this is an array
    pub fn as_array(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get the entries if this is a map
    pub fn as_map(&self) -> Option<&BTreeMap<HostKey, HostValue>> {
        match self {
            HostValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Get the callable id if this is a registered host function
    pub fn as_callable(&self) -> Option<CallableId> {
        match self {
            HostValue::Callable(id) => Some(*id),
            _ => None,
        }
    }

    /// Whether a callable appears anywhere in this value
    pub fn contains_callable(&self) -> bool {
        match self {
            HostValue::Callable(_) => true,
            HostValue::Array(items) => items.iter().any(HostValue::contains_callable),
            HostValue::Map(entries) => entries.values().any(HostValue::contains_callable),
            _ => false,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Nil => write!(f, "nil"),
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::Int(i) => write!(f, "{}", i),
            HostValue::Float(x) => write!(f, "{}", x),
            HostValue::Str(s) => write!(f, "{:?}", s),
            HostValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            HostValue::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            HostValue::Callable(id) => write!(f, "<function {}>", id),
        }
    }
}

impl Serialize for HostValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HostValue::Nil => serializer.serialize_unit(),
            HostValue::Bool(b) => serializer.serialize_bool(*b),
            HostValue::Int(i) => serializer.serialize_i64(*i),
            HostValue::Float(f) => serializer.serialize_f64(*f),
            HostValue::Str(s) => serializer.serialize_str(s),
            HostValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            HostValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            HostValue::Callable(id) => serializer.serialize_str(&format!("<function {}>", id)),
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<i32> for HostValue {
    fn from(i: i32) -> Self {
        HostValue::Int(i as i64)
    }
}

impl From<i64> for HostValue {
    fn from(i: i64) -> Self {
        HostValue::Int(i)
    }
}

impl From<u32> for HostValue {
    fn from(i: u32) -> Self {
        HostValue::Int(i as i64)
    }
}

impl From<f64> for HostValue {
    fn from(f: f64) -> Self {
        HostValue::Float(f)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(items: Vec<HostValue>) -> Self {
        HostValue::Array(items)
    }
}

impl From<BTreeMap<HostKey, HostValue>> for HostValue {
    fn from(entries: BTreeMap<HostKey, HostValue>) -> Self {
        HostValue::Map(entries)
    }
}

impl From<CallableId> for HostValue {
    fn from(id: CallableId) -> Self {
        HostValue::Callable(id)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(HostValue::Nil, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(HostValue::Nil.type_name(), "nil");
        assert_eq!(HostValue::from(1).type_name(), "number");
        assert_eq!(HostValue::from(1.5).type_name(), "number");
        assert_eq!(HostValue::from("x").type_name(), "string");
        assert_eq!(HostValue::Array(vec![]).type_name(), "table");
        assert_eq!(HostValue::Callable(CallableId(3)).type_name(), "function");
    }

    #[test]
    fn test_as_int_accepts_integral_floats() {
        assert_eq!(HostValue::Float(4.0).as_int(), Some(4));
        assert_eq!(HostValue::Float(4.5).as_int(), None);
        assert_eq!(HostValue::Float(f64::NAN).as_int(), None);
        assert_eq!(HostValue::Str("4".into()).as_int(), None);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(HostValue::from(None::<i64>), HostValue::Nil);
        assert_eq!(HostValue::from(Some("a")), HostValue::Str("a".into()));
    }

    #[test]
    fn test_serialize_json() {
        let mut entries = BTreeMap::new();
        entries.insert(HostKey::from("name"), HostValue::from("lua"));
        entries.insert(HostKey::Int(7), HostValue::Bool(true));
        let value = HostValue::Array(vec![
            HostValue::Int(1),
            HostValue::Nil,
            HostValue::Map(entries),
        ]);

        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"[1,null,{"7":true,"name":"lua"}]"#);
    }

    #[test]
    fn test_display() {
        let value = HostValue::Array(vec![HostValue::Int(1), HostValue::from("a")]);
        assert_eq!(value.to_string(), r#"[1, "a"]"#);
        assert_eq!(HostValue::Callable(CallableId(2)).to_string(), "<function #2>");
    }
}
