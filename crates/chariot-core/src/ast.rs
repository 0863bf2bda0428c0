//! Abstract program representation.
//!
//! Chariot programs arrive already parsed: a [`Program`] is a list of [`Node`]
//! statements that serializes to and from JSON, so programs can be stored on
//! disk and fed to the CLI or the session bootstrap.

use serde::{Deserialize, Serialize};

/// A literal constant embedded in a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// One node of the program tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Literal {
        value: Literal,
    },
    /// Bare name lookup.
    Var {
        name: String,
    },
    /// Call by name: scope-bound closures first, then the function registry.
    Call {
        name: String,
        #[serde(default)]
        args: Vec<Node>,
    },
    /// Call whatever closure `callee` evaluates to.
    CallValue {
        callee: Box<Node>,
        #[serde(default)]
        args: Vec<Node>,
    },
    /// `func(params) { body }` literal.
    Func {
        #[serde(default)]
        params: Vec<String>,
        body: Vec<Node>,
    },
    /// Statements evaluated in a child scope.
    Block {
        body: Vec<Node>,
    },
    If {
        cond: Box<Node>,
        then: Vec<Node>,
        #[serde(default)]
        otherwise: Vec<Node>,
    },
    While {
        cond: Box<Node>,
        body: Vec<Node>,
    },
    Break,
    Continue,
    Return {
        #[serde(default)]
        value: Option<Box<Node>>,
    },
}

/// A sequence of top-level statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    pub statements: Vec<Node>,
}

impl Program {
    pub fn new(statements: Vec<Node>) -> Self {
        Self { statements }
    }

    pub fn from_json(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl From<Vec<Node>> for Program {
    fn from(statements: Vec<Node>) -> Self {
        Self::new(statements)
    }
}

// ── Builders ───────────────────────────────────────────────────

pub fn num(n: f64) -> Node {
    Node::Literal {
        value: Literal::Number(n),
    }
}

pub fn text(s: impl Into<String>) -> Node {
    Node::Literal {
        value: Literal::String(s.into()),
    }
}

pub fn boolean(b: bool) -> Node {
    Node::Literal {
        value: Literal::Bool(b),
    }
}

pub fn null() -> Node {
    Node::Literal {
        value: Literal::Null,
    }
}

pub fn var(name: impl Into<String>) -> Node {
    Node::Var { name: name.into() }
}

pub fn call(name: impl Into<String>, args: Vec<Node>) -> Node {
    Node::Call {
        name: name.into(),
        args,
    }
}

pub fn call_value(callee: Node, args: Vec<Node>) -> Node {
    Node::CallValue {
        callee: Box::new(callee),
        args,
    }
}

pub fn func(params: &[&str], body: Vec<Node>) -> Node {
    Node::Func {
        params: params.iter().map(|p| p.to_string()).collect(),
        body,
    }
}

pub fn block(body: Vec<Node>) -> Node {
    Node::Block { body }
}

pub fn if_else(cond: Node, then: Vec<Node>, otherwise: Vec<Node>) -> Node {
    Node::If {
        cond: Box::new(cond),
        then,
        otherwise,
    }
}

pub fn while_loop(cond: Node, body: Vec<Node>) -> Node {
    Node::While {
        cond: Box::new(cond),
        body,
    }
}

pub fn ret(value: Option<Node>) -> Node {
    Node::Return {
        value: value.map(Box::new),
    }
}
