//! SharedMap — a bounded key/value store the host can share with scripts
//!
//! Scripts reach it through the `map_set` / `map_get` / `map_has` builtins.
//! One map can be handed to several VM instances, which then see each
//! other's writes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BridgeError, BridgeResult};
use crate::value::HostValue;

/// Default number of entries a shared map accepts
pub const DEFAULT_MAP_SIZE_LIMIT: usize = 16;

/// Cheaply clonable handle to a bounded string-keyed map
#[derive(Debug, Clone)]
pub struct SharedMap {
    inner: Arc<Mutex<HashMap<String, HostValue>>>,
    limit: usize,
}

impl SharedMap {
    /// Create a map holding at most `limit` entries
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            limit,
        }
    }

    /// Insert or overwrite an entry.
    ///
    /// Overwriting is always allowed; inserting a new key into a full map
    /// fails with [`BridgeError::MapLimit`]. Values holding a
    /// [`HostValue::Callable`] are refused: callable ids are only valid in
    /// the VM that issued them.
    pub fn set(&self, key: String, value: HostValue) -> BridgeResult<()> {
        if value.contains_callable() {
            return Err(BridgeError::type_mismatch("storable value", "host callable"));
        }
        let mut map = self.inner.lock();
        if !map.contains_key(&key) && map.len() >= self.limit {
            return Err(BridgeError::MapLimit(self.limit));
        }
        map.insert(key, value);
        Ok(())
    }

    /// Get a copy of the value stored under `key`
    pub fn get(&self, key: &str) -> Option<HostValue> {
        self.inner.lock().get(key).cloned()
    }

    /// Check whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Maximum number of entries
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Copy of all entries
    pub fn snapshot(&self) -> HashMap<String, HostValue> {
        self.inner.lock().clone()
    }
}

impl Default for SharedMap {
    fn default() -> Self {
        Self::new(DEFAULT_MAP_SIZE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallableId;

    #[test]
    fn test_set_get_has() {
        let map = SharedMap::default();
        map.set("a".into(), HostValue::Int(1)).unwrap();

        assert_eq!(map.get("a"), Some(HostValue::Int(1)));
        assert!(map.contains("a"));
        assert!(!map.contains("b"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_limit_rejects_new_keys_only() {
        let map = SharedMap::new(2);
        map.set("a".into(), HostValue::Int(1)).unwrap();
        map.set("b".into(), HostValue::Int(2)).unwrap();

        assert_eq!(
            map.set("c".into(), HostValue::Int(3)),
            Err(BridgeError::MapLimit(2))
        );
        // Overwrite still fine when full
        map.set("a".into(), HostValue::Int(10)).unwrap();
        assert_eq!(map.get("a"), Some(HostValue::Int(10)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_callables_refused() {
        let map = SharedMap::default();
        let nested = HostValue::Array(vec![HostValue::Int(1), HostValue::Callable(CallableId(3))]);

        assert!(matches!(
            map.set("f".into(), HostValue::Callable(CallableId(3))),
            Err(BridgeError::TypeMismatch { .. })
        ));
        assert!(matches!(map.set("n".into(), nested), Err(BridgeError::TypeMismatch { .. })));
        assert!(map.is_empty());
    }

    #[test]
    fn test_clones_share_storage() {
        let map = SharedMap::default();
        let other = map.clone();
        other.set("k".into(), HostValue::Bool(true)).unwrap();
        assert_eq!(map.get("k"), Some(HostValue::Bool(true)));
        assert_eq!(map.limit(), DEFAULT_MAP_SIZE_LIMIT);
    }
}
