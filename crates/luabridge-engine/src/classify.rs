//! Array-vs-map classification of Lua tables crossing the boundary
//!
//! A table projects as an array when its keys are exactly `1..=len`: every
//! key numeric, every key an exact integer, no duplicates, no gaps. The
//! scan stops at the first key of the wrong kind (non-numeric, or a float
//! with a fractional part) and reports how many contiguous keys it had
//! accepted by then.
//!
//! Lua's `next` gives no ordering guarantee, so integer keys that arrive
//! ahead of the expected index are parked and absorbed once the run catches
//! up with them. A dense array is therefore recognised in any enumeration
//! order. Only the reported length on early exit depends on the order.

use std::collections::BTreeSet;

use mlua::{Table, Value};

/// Outcome of classifying one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    /// Keys are exactly `1..=len`
    pub is_array: bool,
    /// Length of the contiguous run `1..=len` accepted by the scan
    pub len: usize,
}

impl Classification {
    /// `(is_array, len)` tuple form
    pub fn as_tuple(self) -> (bool, usize) {
        (self.is_array, self.len)
    }

    fn rejected(next_index: i64) -> Self {
        Classification {
            is_array: false,
            len: (next_index - 1) as usize,
        }
    }
}

/// Kind of a table key, as far as classification cares
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyKind {
    /// Lua integer subtype
    Integer(i64),
    /// Lua float subtype
    Number(f64),
    /// Anything that is not a number
    Other,
}

impl KeyKind {
    /// Inspect a Lua key
    pub fn of(key: &Value) -> Self {
        match key {
            Value::Integer(i) => KeyKind::Integer(*i),
            Value::Number(n) => KeyKind::Number(*n),
            _ => KeyKind::Other,
        }
    }

    /// Integer value of the key, if it has an exact one
    fn as_index(self) -> Option<i64> {
        match self {
            KeyKind::Integer(i) => Some(i),
            // Same exactness rule as lua_tointegerx: integral and in range
            KeyKind::Number(n) if n.fract() == 0.0 && n >= -(2f64.powi(63)) && n < 2f64.powi(63) => {
                Some(n as i64)
            }
            _ => None,
        }
    }
}

/// Classify a sequence of keys visited once each, in any order
pub fn classify_keys<I>(keys: I) -> Classification
where
    I: IntoIterator<Item = KeyKind>,
{
    let mut next_index: i64 = 1;
    let mut parked: BTreeSet<i64> = BTreeSet::new();

    for key in keys {
        let Some(index) = key.as_index() else {
            return Classification::rejected(next_index);
        };

        if index == next_index {
            next_index += 1;
            while parked.remove(&next_index) {
                next_index += 1;
            }
        } else if index > next_index {
            if !parked.insert(index) {
                return Classification::rejected(next_index);
            }
        } else {
            // Below 1, or a duplicate of an accepted key
            return Classification::rejected(next_index);
        }
    }

    Classification {
        is_array: parked.is_empty(),
        len: (next_index - 1) as usize,
    }
}

/// Classify a table by walking its raw keys
pub fn classify_table(table: &Table) -> Classification {
    let table = table.clone();
    // An iteration failure (out of memory) counts as a disqualifying key
    classify_keys(table.pairs::<Value, Value>().map(|pair| match pair {
        Ok((key, _)) => KeyKind::of(&key),
        Err(_) => KeyKind::Other,
    }))
}

/// Classify any Lua value; non-tables are never arrays
pub fn classify(value: &Value) -> Classification {
    match value {
        Value::Table(table) => classify_table(table),
        _ => Classification::default(),
    }
}
