//! Tree documents on disk.
//!
//! Values are stored tagged with their type code, so a plan kept as a tree
//! attribute comes back as a plan. Closures are stored as their parameters
//! and body and are rebound to the loading runtime's global scope. Host
//! references cannot be stored.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use chariot_core::{
    ChariotError, Closure, ClosureBody, Node, Plan, Result, ScopeRef, TreeNode, TreeRef, Value,
};

/// Nesting beyond this is treated as a cycle.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoredValue {
    #[serde(rename = "V")]
    Null,
    #[serde(rename = "L")]
    Bool { value: bool },
    #[serde(rename = "N")]
    Number { value: f64 },
    #[serde(rename = "S")]
    String { value: String },
    #[serde(rename = "A")]
    Array { items: Vec<StoredValue> },
    #[serde(rename = "M")]
    Map { entries: BTreeMap<String, StoredValue> },
    #[serde(rename = "F")]
    Closure(StoredClosure),
    #[serde(rename = "T")]
    Tree(StoredTree),
    #[serde(rename = "P")]
    Plan(StoredPlan),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredClosure {
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTree {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, StoredValue>,
    #[serde(default)]
    pub children: Vec<StoredTree>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPlan {
    pub name: String,
    pub params: Vec<String>,
    pub trigger: StoredClosure,
    pub guard: StoredClosure,
    pub steps: Vec<StoredClosure>,
    pub drop: StoredClosure,
}

// ── Encoding ───────────────────────────────────────────────────

pub fn encode_value(value: &Value) -> Result<StoredValue> {
    encode(value, 0)
}

fn encode(value: &Value, depth: usize) -> Result<StoredValue> {
    if depth > MAX_DEPTH {
        return Err(ChariotError::Persistence(
            "value nesting too deep (cyclic structure?)".into(),
        ));
    }
    Ok(match value {
        Value::Null => StoredValue::Null,
        Value::Bool(b) => StoredValue::Bool { value: *b },
        Value::Number(n) => StoredValue::Number { value: *n },
        Value::String(s) => StoredValue::String { value: s.clone() },
        Value::Array(items) => StoredValue::Array {
            items: items
                .read()
                .iter()
                .map(|v| encode(v, depth + 1))
                .collect::<Result<_>>()?,
        },
        Value::Map(entries) => StoredValue::Map {
            entries: entries
                .read()
                .iter()
                .map(|(k, v)| Ok((k.clone(), encode(v, depth + 1)?)))
                .collect::<Result<_>>()?,
        },
        Value::Closure(c) => StoredValue::Closure(encode_closure(c)),
        Value::Tree(t) => StoredValue::Tree(encode_tree(t, depth + 1)?),
        Value::Plan(p) => StoredValue::Plan(encode_plan(&p.read())),
        Value::HostRef(h) => {
            return Err(ChariotError::Persistence(format!(
                "host reference '{}' cannot be persisted",
                h.type_name()
            )));
        }
    })
}

fn encode_closure(closure: &Closure) -> StoredClosure {
    match &closure.body {
        ClosureBody::Block(body) => StoredClosure {
            params: closure.params.clone(),
            body: Some(body.as_ref().clone()),
            builtin: None,
        },
        ClosureBody::Builtin(name) => StoredClosure {
            params: closure.params.clone(),
            body: None,
            builtin: Some(name.clone()),
        },
    }
}

fn encode_plan(plan: &Plan) -> StoredPlan {
    StoredPlan {
        name: plan.name.clone(),
        params: plan.params.clone(),
        trigger: encode_closure(&plan.trigger),
        guard: encode_closure(&plan.guard),
        steps: plan.steps.iter().map(|s| encode_closure(s)).collect(),
        drop: encode_closure(&plan.drop),
    }
}

fn encode_tree(tree: &TreeRef, depth: usize) -> Result<StoredTree> {
    if depth > MAX_DEPTH {
        return Err(ChariotError::Persistence(
            "tree nesting too deep (cyclic structure?)".into(),
        ));
    }
    let node = tree.read();
    Ok(StoredTree {
        name: node.name.clone(),
        attributes: node
            .attributes
            .iter()
            .map(|(k, v)| Ok((k.clone(), encode(v, depth + 1)?)))
            .collect::<Result<_>>()?,
        children: node
            .children
            .iter()
            .map(|c| encode_tree(c, depth + 1))
            .collect::<Result<_>>()?,
    })
}

// ── Decoding ───────────────────────────────────────────────────

/// Rebuild a value; closures capture `scope`.
pub fn decode_value(stored: &StoredValue, scope: &ScopeRef) -> Result<Value> {
    Ok(match stored {
        StoredValue::Null => Value::Null,
        StoredValue::Bool { value } => Value::Bool(*value),
        StoredValue::Number { value } => Value::Number(*value),
        StoredValue::String { value } => Value::String(value.clone()),
        StoredValue::Array { items } => Value::array(
            items
                .iter()
                .map(|v| decode_value(v, scope))
                .collect::<Result<_>>()?,
        ),
        StoredValue::Map { entries } => Value::map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), decode_value(v, scope)?)))
                .collect::<Result<HashMap<_, _>>>()?,
        ),
        StoredValue::Closure(c) => Value::Closure(decode_closure(c, scope)?),
        StoredValue::Tree(t) => Value::Tree(decode_tree(t, scope)?),
        StoredValue::Plan(p) => Value::plan(Plan::new(
            p.name.clone(),
            p.params.clone(),
            decode_closure(&p.trigger, scope)?,
            decode_closure(&p.guard, scope)?,
            p.steps
                .iter()
                .map(|s| decode_closure(s, scope))
                .collect::<Result<_>>()?,
            decode_closure(&p.drop, scope)?,
        )),
    })
}

fn decode_closure(stored: &StoredClosure, scope: &ScopeRef) -> Result<Arc<Closure>> {
    match (&stored.body, &stored.builtin) {
        (Some(body), _) => Ok(Arc::new(Closure::new(
            stored.params.clone(),
            body.clone(),
            Arc::clone(scope),
        ))),
        (None, Some(name)) => Ok(Arc::new(Closure::builtin(name.clone()))),
        (None, None) => Err(ChariotError::Persistence(
            "stored function has neither a body nor a builtin name".into(),
        )),
    }
}

fn decode_tree(stored: &StoredTree, scope: &ScopeRef) -> Result<TreeRef> {
    let mut node = TreeNode::new(stored.name.clone());
    for (k, v) in &stored.attributes {
        node.attributes.insert(k.clone(), decode_value(v, scope)?);
    }
    for child in &stored.children {
        node.children.push(decode_tree(child, scope)?);
    }
    Ok(node.into_ref())
}

// ── Documents ──────────────────────────────────────────────────

pub fn tree_to_json(tree: &TreeRef) -> Result<String> {
    Ok(serde_json::to_string_pretty(&encode_tree(tree, 0)?)?)
}

pub fn tree_from_json(raw: &str, scope: &ScopeRef) -> Result<TreeRef> {
    let stored: StoredTree = serde_json::from_str(raw)?;
    decode_tree(&stored, scope)
}

pub fn save_tree(path: &Path, tree: &TreeRef) -> Result<()> {
    std::fs::write(path, tree_to_json(tree)?)?;
    Ok(())
}

pub fn load_tree(path: &Path, scope: &ScopeRef) -> Result<TreeRef> {
    let raw = std::fs::read_to_string(path)?;
    tree_from_json(&raw, scope)
}
