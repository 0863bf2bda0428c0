use std::collections::HashMap;
use std::sync::Arc;

use chariot_core::{ChariotError, Closure, ClosureBody, Node, Result, Scope, ScopeRef, Value};

use crate::registry::FunctionSpec;
use crate::runtime::Runtime;

/// Nested closure calls allowed before evaluation gives up.
pub const MAX_CALL_DEPTH: usize = 200;

/// Non-local exits travelling up the evaluation stack.
enum Unwind {
    Error(ChariotError),
    Break,
    Continue,
    Return(Value),
}

impl From<ChariotError> for Unwind {
    fn from(e: ChariotError) -> Self {
        Self::Error(e)
    }
}

type Flow = std::result::Result<Value, Unwind>;

/// Explicit evaluation context: which runtime, which scope is current, and
/// any transient beliefs layered over the agent stores for this call.
pub struct Evaluator<'rt> {
    rt: &'rt Runtime,
    scope: ScopeRef,
    beliefs: Option<Arc<HashMap<String, Value>>>,
    depth: usize,
}

impl<'rt> Evaluator<'rt> {
    pub fn new(rt: &'rt Runtime, scope: ScopeRef) -> Self {
        Self {
            rt,
            scope,
            beliefs: None,
            depth: 0,
        }
    }

    pub fn runtime(&self) -> &'rt Runtime {
        self.rt
    }

    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    /// Transient belief for `key`, if this call layered one in.
    pub fn belief_override(&self, key: &str) -> Option<Value> {
        self.beliefs.as_ref().and_then(|b| b.get(key).cloned())
    }

    /// Swap in a new overlay, returning the previous one.
    pub(crate) fn replace_beliefs(
        &mut self,
        beliefs: Option<Arc<HashMap<String, Value>>>,
    ) -> Option<Arc<HashMap<String, Value>>> {
        std::mem::replace(&mut self.beliefs, beliefs)
    }

    /// The overlay a nested run sees: the current one with `vars` laid on
    /// top. Empty `vars` keep the current overlay as is.
    pub(crate) fn layered_beliefs(
        &self,
        vars: HashMap<String, Value>,
    ) -> Option<Arc<HashMap<String, Value>>> {
        if vars.is_empty() {
            return self.beliefs.clone();
        }
        let mut merged = self.beliefs.as_deref().cloned().unwrap_or_default();
        merged.extend(vars);
        Some(Arc::new(merged))
    }

    // ── Entry points ───────────────────────────────────────────

    /// Evaluate statements in the current scope. `return` at this level ends
    /// the sequence with its value.
    pub fn exec_statements(&mut self, nodes: &[Node]) -> Result<Value> {
        match self.eval_seq(nodes) {
            Ok(v) | Err(Unwind::Return(v)) => Ok(v),
            Err(Unwind::Error(e)) => Err(e),
            Err(Unwind::Break) | Err(Unwind::Continue) => {
                Err(ChariotError::Eval("break/continue outside of a loop".into()))
            }
        }
    }

    pub fn evaluate(&mut self, node: &Node) -> Result<Value> {
        self.exec_statements(std::slice::from_ref(node))
    }

    /// Call a closure with positional arguments. Missing parameters are null;
    /// extra arguments are ignored.
    pub fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Result<Value> {
        match &closure.body {
            ClosureBody::Builtin(name) => self.call_builtin_named(name, args),
            ClosureBody::Block(body) => {
                let parent = closure
                    .scope
                    .clone()
                    .unwrap_or_else(|| Arc::clone(self.rt.globals()));
                let scope = Scope::child(&parent);
                let mut args = args.into_iter();
                for param in &closure.params {
                    scope.bind(param, args.next().unwrap_or_default());
                }
                self.run_body(scope, body)
            }
        }
    }

    /// Run a closure's body directly in `scope` instead of a fresh child of
    /// its captured scope. Plan runs use this so bindings made by one step are
    /// seen by the next.
    pub fn call_closure_in(&mut self, closure: &Closure, scope: &ScopeRef) -> Result<Value> {
        match &closure.body {
            ClosureBody::Builtin(name) => self.call_builtin_named(name, Vec::new()),
            ClosureBody::Block(body) => self.run_body(Arc::clone(scope), body),
        }
    }

    fn run_body(&mut self, scope: ScopeRef, body: &[Node]) -> Result<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ChariotError::Eval(format!(
                "maximum call depth of {MAX_CALL_DEPTH} exceeded"
            )));
        }
        self.depth += 1;
        let flow = self.in_scope(scope, |ev| ev.eval_seq(body));
        self.depth -= 1;
        match flow {
            Ok(v) | Err(Unwind::Return(v)) => Ok(v),
            Err(Unwind::Error(e)) => Err(e),
            Err(Unwind::Break) | Err(Unwind::Continue) => {
                Err(ChariotError::Eval("break/continue outside of a loop".into()))
            }
        }
    }

    fn in_scope<T>(&mut self, scope: ScopeRef, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.scope, scope);
        let out = f(self);
        self.scope = saved;
        out
    }

    // ── Resolution ─────────────────────────────────────────────

    /// Bare-name lookup: scope chain, host objects, named collections, named
    /// tree nodes, then the function registry.
    pub fn resolve(&self, name: &str) -> Result<Value> {
        if let Some(v) = self.scope.get(name) {
            return Ok(v);
        }
        if let Some(obj) = self.rt.object(name) {
            return Ok(Value::HostRef(obj));
        }
        if let Some(v) = self.rt.collection(name) {
            return Ok(v);
        }
        if let Some(node) = self.rt.node(name) {
            return Ok(Value::Tree(node));
        }
        if self.rt.registry().contains(name) {
            return Ok(Value::closure(Closure::builtin(name)));
        }
        Err(ChariotError::UndefinedVariable(name.to_string()))
    }

    fn call_builtin_named(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let registry = Arc::clone(self.rt.registry());
        match registry.get(name) {
            Some(spec) => self.call_builtin(spec, args),
            None => Err(ChariotError::UndefinedFunction(name.to_string())),
        }
    }

    fn call_builtin(&mut self, spec: &FunctionSpec, args: Vec<Value>) -> Result<Value> {
        spec.check_arity(args.len())?;
        (spec.func)(self, args)
    }

    // ── Evaluation ─────────────────────────────────────────────

    fn eval_seq(&mut self, nodes: &[Node]) -> Flow {
        let mut last = Value::Null;
        for node in nodes {
            last = self.eval(node)?;
        }
        Ok(last)
    }

    fn eval_args(&mut self, args: &[Node]) -> std::result::Result<Vec<Value>, Unwind> {
        args.iter().map(|a| self.eval(a)).collect()
    }

    fn eval(&mut self, node: &Node) -> Flow {
        match node {
            Node::Literal { value } => Ok(literal(value)),
            Node::Var { name } => Ok(self.resolve(name)?),
            Node::Call { name, args } => self.eval_call(name, args),
            Node::CallValue { callee, args } => {
                let closure = self.eval(callee)?.expect_closure("call")?;
                let args = self.eval_args(args)?;
                Ok(self.call_closure(&closure, args)?)
            }
            Node::Func { params, body } => Ok(Value::closure(Closure::new(
                params.clone(),
                body.clone(),
                Arc::clone(&self.scope),
            ))),
            Node::Block { body } => {
                let scope = Scope::child(&self.scope);
                self.in_scope(scope, |ev| ev.eval_seq(body))
            }
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if self.eval(cond)?.is_truthy() {
                    then
                } else {
                    otherwise
                };
                let scope = Scope::child(&self.scope);
                self.in_scope(scope, |ev| ev.eval_seq(branch))
            }
            Node::While { cond, body } => {
                let mut last = Value::Null;
                while self.eval(cond)?.is_truthy() {
                    let scope = Scope::child(&self.scope);
                    match self.in_scope(scope, |ev| ev.eval_seq(body)) {
                        Ok(v) => last = v,
                        Err(Unwind::Break) => break,
                        Err(Unwind::Continue) => continue,
                        Err(other) => return Err(other),
                    }
                }
                Ok(last)
            }
            Node::Break => Err(Unwind::Break),
            Node::Continue => Err(Unwind::Continue),
            Node::Return { value } => {
                let v = match value {
                    Some(node) => self.eval(node)?,
                    None => Value::Null,
                };
                Err(Unwind::Return(v))
            }
        }
    }

    /// Calls by name prefer a closure bound in scope, then the registry.
    fn eval_call(&mut self, name: &str, args: &[Node]) -> Flow {
        if let Some(Value::Closure(closure)) = self.scope.get(name) {
            let args = self.eval_args(args)?;
            return Ok(self.call_closure(&closure, args)?);
        }

        let registry = Arc::clone(self.rt.registry());
        let Some(spec) = registry.get(name) else {
            return Err(ChariotError::UndefinedFunction(name.to_string()).into());
        };

        let mut values = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            match arg {
                Node::Var { name } if i == 0 && spec.quote_first => {
                    values.push(Value::String(name.clone()))
                }
                other => values.push(self.eval(other)?),
            }
        }
        Ok(self.call_builtin(spec, values)?)
    }
}

fn literal(value: &chariot_core::ast::Literal) -> Value {
    use chariot_core::ast::Literal;
    match value {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
    }
}
