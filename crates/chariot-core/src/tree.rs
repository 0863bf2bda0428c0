use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::value::Value;

pub type TreeRef = Arc<RwLock<TreeNode>>;

/// A named, attributed node with ordered children. Collaborators build
/// documents out of these; the core only routes property access.
#[derive(Debug, Clone, Default)]
pub struct TreeNode {
    pub name: String,
    pub attributes: HashMap<String, Value>,
    pub children: Vec<TreeRef>,
}

impl TreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn into_ref(self) -> TreeRef {
        Arc::new(RwLock::new(self))
    }

    /// Attributes win; `name` falls back to the node name.
    pub fn property(&self, key: &str) -> Value {
        if let Some(v) = self.attributes.get(key) {
            return v.clone();
        }
        match key {
            "name" => Value::String(self.name.clone()),
            _ => Value::Null,
        }
    }

    pub fn set_property(&mut self, key: &str, value: Value) {
        self.attributes.insert(key.to_string(), value);
    }

    pub fn add_child(&mut self, child: TreeRef) {
        self.children.push(child);
    }
}
