use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ChariotError, Result};
use crate::value::{TypeTag, Value};

pub type ScopeRef = Arc<Scope>;

/// A binding plus the tag it was declared with.
#[derive(Debug, Clone)]
pub struct ScopeEntry {
    pub value: Value,
    pub tag: TypeTag,
    /// Untyped bindings accept any value on `setq`.
    pub typed: bool,
}

impl ScopeEntry {
    pub fn typed(value: Value, tag: TypeTag) -> Self {
        Self {
            value,
            tag,
            typed: tag != TypeTag::Null,
        }
    }

    pub fn untyped(value: Value) -> Self {
        let tag = value.type_tag();
        Self {
            value,
            tag,
            typed: false,
        }
    }
}

/// One lexical environment. Lookups walk the parent chain.
#[derive(Debug, Default)]
pub struct Scope {
    vars: RwLock<HashMap<String, ScopeEntry>>,
    parent: Option<ScopeRef>,
}

impl Scope {
    /// A root scope with no parent.
    pub fn root() -> ScopeRef {
        Arc::new(Self::default())
    }

    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Arc::new(Self {
            vars: RwLock::new(HashMap::new()),
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn parent(&self) -> Option<&ScopeRef> {
        self.parent.as_ref()
    }

    /// Bind `name` in this scope, replacing any existing local binding.
    pub fn declare(&self, name: &str, entry: ScopeEntry) -> Result<()> {
        if entry.typed && !entry.value.is_null() && entry.value.type_tag() != entry.tag {
            return Err(ChariotError::TypeMismatch(format!(
                "cannot declare {} as {}: value is {}",
                name,
                entry.tag,
                entry.value.type_tag()
            )));
        }
        self.vars.write().insert(name.to_string(), entry);
        Ok(())
    }

    /// Untyped local binding; never fails.
    pub fn bind(&self, name: &str, value: Value) {
        self.vars.write().insert(name.to_string(), ScopeEntry::untyped(value));
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.lookup(name).map(|e| e.value)
    }

    pub fn lookup(&self, name: &str) -> Option<ScopeEntry> {
        if let Some(entry) = self.vars.read().get(name) {
            return Some(entry.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.vars.read().get(name).map(|e| e.value.clone())
    }

    /// Update the nearest binding of `name`. Returns `Ok(false)` when no
    /// scope in the chain holds it.
    pub fn assign(&self, name: &str, value: Value) -> Result<bool> {
        {
            let mut vars = self.vars.write();
            if let Some(entry) = vars.get_mut(name) {
                if entry.typed && value.type_tag() != entry.tag {
                    return Err(ChariotError::TypeMismatch(format!(
                        "cannot assign to {}: declared {}, got {}",
                        name,
                        entry.tag,
                        value.type_tag()
                    )));
                }
                if !entry.typed {
                    entry.tag = value.type_tag();
                }
                entry.value = value;
                return Ok(true);
            }
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Ok(false),
        }
    }

    /// Shallow copy of this scope's own bindings.
    pub fn snapshot(&self) -> HashMap<String, ScopeEntry> {
        self.vars.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.vars.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.read().is_empty()
    }
}
