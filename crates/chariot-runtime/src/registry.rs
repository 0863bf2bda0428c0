use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chariot_core::{ChariotError, Result, Value};

use crate::evaluator::Evaluator;

/// Native implementation of a built-in function.
pub type BuiltinFn = Arc<dyn Fn(&mut Evaluator<'_>, Vec<Value>) -> Result<Value> + Send + Sync>;

/// A registry entry: the callable plus what dispatch needs to check first.
#[derive(Clone)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions.
    pub max_args: Option<usize>,
    pub usage: &'static str,
    /// The first argument is passed as the bare name it was written as,
    /// not evaluated (`declare(x, ...)`).
    pub quote_first: bool,
    pub func: BuiltinFn,
}

impl FunctionSpec {
    pub fn new<F>(
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        usage: &'static str,
        func: F,
    ) -> Self
    where
        F: Fn(&mut Evaluator<'_>, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name,
            min_args,
            max_args,
            usage,
            quote_first: false,
            func: Arc::new(func),
        }
    }

    pub fn quoted(mut self) -> Self {
        self.quote_first = true;
        self
    }

    pub fn check_arity(&self, got: usize) -> Result<()> {
        let within = got >= self.min_args && self.max_args.is_none_or(|max| got <= max);
        if within {
            return Ok(());
        }
        let expected = match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        };
        Err(ChariotError::Arity {
            function: self.name.to_string(),
            expected,
            usage: self.usage.to_string(),
            got,
        })
    }
}

impl fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .finish()
    }
}

/// Flat name → function table. Built once, then shared read-only between a
/// runtime and every clone of it.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<&'static str, FunctionSpec>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the standard built-in library.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register_all(&mut registry);
        registry
    }

    pub fn register(&mut self, spec: FunctionSpec) {
        self.functions.insert(spec.name, spec);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
