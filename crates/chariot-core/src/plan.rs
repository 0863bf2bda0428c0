use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::{ChariotError, Result};
use crate::scope::ScopeRef;
use crate::value::{Closure, Value};

pub type PlanRef = Arc<RwLock<Plan>>;

/// A reactive unit of work: run `steps` in order while `trigger` and `guard`
/// hold, abandoning the rest as soon as `drop` turns true.
#[derive(Debug, Clone)]
pub struct Plan {
    pub name: String,
    pub params: Vec<String>,
    pub trigger: Arc<Closure>,
    pub guard: Arc<Closure>,
    pub steps: Vec<Arc<Closure>>,
    pub drop: Arc<Closure>,
}

impl Plan {
    pub fn new(
        name: impl Into<String>,
        params: Vec<String>,
        trigger: Arc<Closure>,
        guard: Arc<Closure>,
        steps: Vec<Arc<Closure>>,
        drop: Arc<Closure>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            trigger,
            guard,
            steps,
            drop,
        }
    }

    /// Build a plan from constructor arguments, checking every field's type.
    pub fn from_values(
        name: &Value,
        params: &Value,
        trigger: &Value,
        guard: &Value,
        steps: &Value,
        drop: &Value,
    ) -> Result<Self> {
        Ok(Self {
            name: name.expect_str("plan")?.to_string(),
            params: param_names(params)?,
            trigger: trigger.expect_closure("plan trigger")?,
            guard: guard.expect_closure("plan guard")?,
            steps: step_closures(steps)?,
            drop: drop.expect_closure("plan drop")?,
        })
    }

    /// Copy whose closures all capture `scope`. Used when a plan moves into
    /// another runtime.
    pub fn rebind(&self, scope: &ScopeRef) -> Self {
        Self {
            name: self.name.clone(),
            params: self.params.clone(),
            trigger: self.trigger.rebind(scope),
            guard: self.guard.rebind(scope),
            steps: self.steps.iter().map(|s| s.rebind(scope)).collect(),
            drop: self.drop.rebind(scope),
        }
    }

    /// Read a field by property name (case-insensitive).
    pub fn field(&self, property: &str) -> Result<Value> {
        match property.to_ascii_lowercase().as_str() {
            "name" => Ok(Value::String(self.name.clone())),
            "params" => Ok(Value::array(
                self.params.iter().map(|p| Value::String(p.clone())).collect(),
            )),
            "trigger" => Ok(Value::Closure(Arc::clone(&self.trigger))),
            "guard" => Ok(Value::Closure(Arc::clone(&self.guard))),
            "steps" => Ok(Value::array(
                self.steps.iter().map(|s| Value::Closure(Arc::clone(s))).collect(),
            )),
            "drop" | "dropcond" => Ok(Value::Closure(Arc::clone(&self.drop))),
            _ => Err(not_found(property)),
        }
    }

    pub fn set_field(&mut self, property: &str, value: Value) -> Result<()> {
        match property.to_ascii_lowercase().as_str() {
            "name" => self.name = value.expect_str("setProp plan.name")?.to_string(),
            "params" => self.params = param_names(&value)?,
            "trigger" => self.trigger = value.expect_closure("setProp plan.trigger")?,
            "guard" => self.guard = value.expect_closure("setProp plan.guard")?,
            "steps" => self.steps = step_closures(&value)?,
            "drop" | "dropcond" => self.drop = value.expect_closure("setProp plan.drop")?,
            _ => return Err(not_found(property)),
        }
        Ok(())
    }
}

fn not_found(property: &str) -> ChariotError {
    ChariotError::PropertyNotFound {
        property: property.to_string(),
        target: "Plan".into(),
    }
}

fn param_names(value: &Value) -> Result<Vec<String>> {
    let Value::Array(items) = value else {
        return Err(ChariotError::type_mismatch(
            "plan",
            format!("params must be an array of strings, got {}", value.type_tag().name()),
        ));
    };
    items
        .read()
        .iter()
        .map(|v| v.expect_str("plan params").map(str::to_string))
        .collect()
}

fn step_closures(value: &Value) -> Result<Vec<Arc<Closure>>> {
    let Value::Array(items) = value else {
        return Err(ChariotError::type_mismatch(
            "plan",
            format!("steps must be an array of functions, got {}", value.type_tag().name()),
        ));
    };
    items
        .read()
        .iter()
        .map(|v| v.expect_closure("plan steps"))
        .collect()
}
