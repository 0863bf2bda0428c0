use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::ast::Node;
use crate::error::{ChariotError, Result};
use crate::plan::{Plan, PlanRef};
use crate::scope::ScopeRef;
use crate::tree::TreeRef;

/// Absolute tolerance used for numeric equality.
pub const NUMBER_EPSILON: f64 = 1e-9;

pub type ArrayRef = Arc<RwLock<Vec<Value>>>;
pub type MapRef = Arc<RwLock<HashMap<String, Value>>>;

// ── Type tags ──────────────────────────────────────────────────

/// Stable single-character type code carried by every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Number,
    String,
    Bool,
    Array,
    Map,
    Closure,
    Tree,
    HostRef,
    Plan,
    Null,
}

impl TypeTag {
    pub fn code(self) -> char {
        match self {
            Self::Number => 'N',
            Self::String => 'S',
            Self::Bool => 'L',
            Self::Array => 'A',
            Self::Map => 'M',
            Self::Closure => 'F',
            Self::Tree => 'T',
            Self::HostRef => 'H',
            Self::Plan => 'P',
            Self::Null => 'V',
        }
    }

    /// Parse a declaration type code. `V` is the untyped declaration.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "N" => Some(Self::Number),
            "S" => Some(Self::String),
            "L" => Some(Self::Bool),
            "A" => Some(Self::Array),
            "M" => Some(Self::Map),
            "F" => Some(Self::Closure),
            "T" => Some(Self::Tree),
            "H" => Some(Self::HostRef),
            "P" => Some(Self::Plan),
            "V" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Bool => "boolean",
            Self::Array => "array",
            Self::Map => "map",
            Self::Closure => "function",
            Self::Tree => "tree node",
            Self::HostRef => "host reference",
            Self::Plan => "plan",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

// ── Host objects ───────────────────────────────────────────────

/// An opaque handle to a resource owned by a collaborator (a connection,
/// a file, a solver). Exposes optional named properties as a state snapshot.
pub trait HostObject: Send + Sync + fmt::Debug {
    /// Short type name used in messages.
    fn type_name(&self) -> &str;

    /// Read a named property. `None` surfaces as null.
    fn property(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Write a named property.
    fn set_property(&self, name: &str, _value: Value) -> Result<()> {
        Err(ChariotError::TypeMismatch(format!(
            "cannot set property '{}' on {}",
            name,
            self.type_name()
        )))
    }
}

// ── Closures ───────────────────────────────────────────────────

/// What a closure runs when called.
#[derive(Debug, Clone)]
pub enum ClosureBody {
    /// User-defined statements.
    Block(Arc<Vec<Node>>),
    /// A reference to a registry function, produced when a bare name resolves
    /// to a built-in.
    Builtin(String),
}

/// A callable value: parameter list, body, and the scope it was defined in.
#[derive(Clone)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: ClosureBody,
    pub scope: Option<ScopeRef>,
}

impl Closure {
    pub fn new(params: Vec<String>, body: Vec<Node>, scope: ScopeRef) -> Self {
        Self {
            params,
            body: ClosureBody::Block(Arc::new(body)),
            scope: Some(scope),
        }
    }

    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            params: Vec::new(),
            body: ClosureBody::Builtin(name.into()),
            scope: None,
        }
    }

    /// Copy of this closure capturing `scope` instead of its original scope.
    pub fn rebind(&self, scope: &ScopeRef) -> Arc<Closure> {
        let scope = match self.body {
            ClosureBody::Builtin(_) => None,
            ClosureBody::Block(_) => Some(Arc::clone(scope)),
        };
        Arc::new(Self {
            params: self.params.clone(),
            body: self.body.clone(),
            scope,
        })
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            ClosureBody::Builtin(name) => write!(f, "<builtin {name}>"),
            ClosureBody::Block(body) => write!(
                f,
                "<func({}) {} stmt(s)>",
                self.params.join(", "),
                body.len()
            ),
        }
    }
}

// ── Values ─────────────────────────────────────────────────────

/// A Chariot runtime value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(ArrayRef),
    Map(MapRef),
    Closure(Arc<Closure>),
    Tree(TreeRef),
    HostRef(Arc<dyn HostObject>),
    Plan(PlanRef),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Arc::new(RwLock::new(items)))
    }

    pub fn map(entries: HashMap<String, Value>) -> Self {
        Self::Map(Arc::new(RwLock::new(entries)))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn closure(c: Closure) -> Self {
        Self::Closure(Arc::new(c))
    }

    pub fn plan(p: Plan) -> Self {
        Self::Plan(Arc::new(RwLock::new(p)))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Null => TypeTag::Null,
            Self::Bool(_) => TypeTag::Bool,
            Self::Number(_) => TypeTag::Number,
            Self::String(_) => TypeTag::String,
            Self::Array(_) => TypeTag::Array,
            Self::Map(_) => TypeTag::Map,
            Self::Closure(_) => TypeTag::Closure,
            Self::Tree(_) => TypeTag::Tree,
            Self::HostRef(_) => TypeTag::HostRef,
            Self::Plan(_) => TypeTag::Plan,
        }
    }

    pub fn type_code(&self) -> char {
        self.type_tag().code()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Condition semantics used by `if`, `while`, and plan gates.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Array(a) => !a.read().is_empty(),
            Self::Map(m) => !m.read().is_empty(),
            Self::Closure(_) | Self::Tree(_) | Self::HostRef(_) | Self::Plan(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric argument or a type mismatch naming `function`.
    pub fn expect_number(&self, function: &str) -> Result<f64> {
        self.as_number().ok_or_else(|| {
            ChariotError::type_mismatch(function, format!("expected number, got {}", self.type_tag().name()))
        })
    }

    pub fn expect_str(&self, function: &str) -> Result<&str> {
        self.as_str().ok_or_else(|| {
            ChariotError::type_mismatch(function, format!("expected string, got {}", self.type_tag().name()))
        })
    }

    pub fn expect_closure(&self, function: &str) -> Result<Arc<Closure>> {
        match self {
            Self::Closure(c) => Ok(Arc::clone(c)),
            other => Err(ChariotError::type_mismatch(
                function,
                format!("expected function, got {}", other.type_tag().name()),
            )),
        }
    }

    pub fn expect_plan(&self, function: &str) -> Result<PlanRef> {
        match self {
            Self::Plan(p) => Ok(Arc::clone(p)),
            other => Err(ChariotError::type_mismatch(
                function,
                format!("expected plan, got {}", other.type_tag().name()),
            )),
        }
    }

    /// Structural equality for scalars and collections, identity for
    /// closures, plans, tree nodes, and host references.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => (a - b).abs() <= NUMBER_EPSILON,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read(), b.read());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read(), b.read());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.equals(w)))
            }
            (Self::Closure(a), Self::Closure(b)) => Arc::ptr_eq(a, b),
            (Self::Tree(a), Self::Tree(b)) => Arc::ptr_eq(a, b),
            (Self::Plan(a), Self::Plan(b)) => Arc::ptr_eq(a, b),
            (Self::HostRef(a), Self::HostRef(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }

    /// Identity of the shared container behind this value, if any.
    fn container_id(&self) -> Option<usize> {
        match self {
            Self::Array(a) => Some(Arc::as_ptr(a) as *const () as usize),
            Self::Map(m) => Some(Arc::as_ptr(m) as *const () as usize),
            Self::Tree(t) => Some(Arc::as_ptr(t) as *const () as usize),
            _ => None,
        }
    }

    /// True when `container` is this value or is nested anywhere inside it,
    /// following array items, map entries, tree attributes and children.
    pub fn reaches(&self, container: &Value) -> bool {
        let Some(target) = container.container_id() else {
            return false;
        };
        let mut seen = HashSet::new();
        let mut pending = vec![self.clone()];
        while let Some(value) = pending.pop() {
            let Some(id) = value.container_id() else {
                continue;
            };
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            match &value {
                Self::Array(a) => pending.extend(a.read().iter().cloned()),
                Self::Map(m) => pending.extend(m.read().values().cloned()),
                Self::Tree(t) => {
                    let t = t.read();
                    pending.extend(t.attributes.values().cloned());
                    pending.extend(t.children.iter().cloned().map(Self::Tree));
                }
                _ => {}
            }
        }
        false
    }

    /// Refuse to store `value` inside this container when that would make
    /// the container contain itself.
    pub fn ensure_acyclic(&self, function: &str, value: &Value) -> Result<()> {
        if value.reaches(self) {
            return Err(ChariotError::InvalidArgument(format!(
                "{function}: a {} cannot contain itself",
                self.type_tag().name()
            )));
        }
        Ok(())
    }

    // ── Property access ────────────────────────────────────────

    /// Polymorphic property read. Absent properties are null; a target that
    /// carries no properties is a type mismatch.
    pub fn get_prop(&self, name: &str) -> Result<Value> {
        match self {
            Self::Map(m) => Ok(m.read().get(name).cloned().unwrap_or_default()),
            Self::Tree(t) => Ok(t.read().property(name)),
            Self::Plan(p) => p.read().field(name),
            Self::HostRef(h) => Ok(h.property(name).unwrap_or_default()),
            other => Err(ChariotError::TypeMismatch(format!(
                "getProp: {} has no properties",
                other.type_tag().name()
            ))),
        }
    }

    pub fn set_prop(&self, name: &str, value: Value) -> Result<()> {
        match self {
            Self::Map(m) => {
                self.ensure_acyclic("setProp", &value)?;
                m.write().insert(name.to_string(), value);
                Ok(())
            }
            Self::Tree(t) => {
                self.ensure_acyclic("setProp", &value)?;
                t.write().set_property(name, value);
                Ok(())
            }
            Self::Plan(p) => p.write().set_field(name, value),
            Self::HostRef(h) => h.set_property(name, value),
            other => Err(ChariotError::TypeMismatch(format!(
                "setProp: {} has no properties",
                other.type_tag().name()
            ))),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::String(s) => write!(f, "{s}"),
            Self::Array(a) => {
                let items: Vec<String> = a.read().iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::Map(m) => {
                let m = m.read();
                let mut keys: Vec<&String> = m.keys().collect();
                keys.sort();
                let items: Vec<String> = keys.iter().map(|k| format!("{}: {}", k, m[*k])).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
            Self::Closure(c) => write!(f, "{c:?}"),
            Self::Tree(t) => write!(f, "<tree {}>", t.read().name),
            Self::HostRef(h) => write!(f, "<host {}>", h.type_name()),
            Self::Plan(p) => write!(f, "<plan {}>", p.read().name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::array(items)
    }
}
