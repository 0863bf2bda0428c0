use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use chariot_core::Value;

/// Per-agent belief map. Writes always succeed; reads of an absent key
/// yield null so gates can reference beliefs that have not arrived yet.
#[derive(Debug, Clone, Default)]
pub struct BeliefStore {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl BeliefStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.inner.write().insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Value {
        self.inner.read().get(key).cloned().unwrap_or_default()
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().remove(key)
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
