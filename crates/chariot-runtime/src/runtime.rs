use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use chariot_core::{
    HostObject, Program, Result, Scope, ScopeEntry, ScopeRef, TreeRef, TypeTag, Value,
};

use crate::evaluator::Evaluator;
use crate::log::{LogSink, MemoryLogSink};
use crate::manager::AgentManager;
use crate::registry::FunctionRegistry;

/// Names pre-bound in every global scope and hidden from listings.
pub const CONSTANTS: [&str; 6] = ["True", "False", "Null", "true", "false", "null"];

/// Shallow copy of a runtime's shareable state, taken at one instant.
#[derive(Clone, Default)]
pub struct RuntimeSnapshot {
    pub globals: HashMap<String, ScopeEntry>,
    pub objects: HashMap<String, Arc<dyn HostObject>>,
    pub collections: HashMap<String, Value>,
    pub nodes: HashMap<String, TreeRef>,
}

/// Evaluator instance: one global scope, host registries, and the lock that
/// keeps evaluation single-threaded.
pub struct Runtime {
    registry: Arc<FunctionRegistry>,
    globals: ScopeRef,
    objects: RwLock<HashMap<String, Arc<dyn HostObject>>>,
    collections: RwLock<HashMap<String, Value>>,
    nodes: RwLock<HashMap<String, TreeRef>>,
    sink: Arc<dyn LogSink>,
    agents: AgentManager,
    exec: Mutex<()>,
}

/// Builder for [`Runtime`]; unset parts get defaults.
#[derive(Default)]
pub struct RuntimeBuilder {
    registry: Option<Arc<FunctionRegistry>>,
    sink: Option<Arc<dyn LogSink>>,
    agents: Option<AgentManager>,
}

impl RuntimeBuilder {
    pub fn registry(mut self, registry: Arc<FunctionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn agents(mut self, agents: AgentManager) -> Self {
        self.agents = Some(agents);
        self
    }

    pub fn build(self) -> Arc<Runtime> {
        let globals = Scope::root();
        globals.bind("True", Value::Bool(true));
        globals.bind("true", Value::Bool(true));
        globals.bind("False", Value::Bool(false));
        globals.bind("false", Value::Bool(false));
        globals.bind("Null", Value::Null);
        globals.bind("null", Value::Null);

        Arc::new(Runtime {
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(FunctionRegistry::with_builtins())),
            globals,
            objects: RwLock::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
            nodes: RwLock::new(HashMap::new()),
            sink: self
                .sink
                .unwrap_or_else(|| Arc::new(MemoryLogSink::default())),
            agents: self.agents.unwrap_or_default(),
            exec: Mutex::new(()),
        })
    }
}

impl Runtime {
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn globals(&self) -> &ScopeRef {
        &self.globals
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    pub fn agents(&self) -> &AgentManager {
        &self.agents
    }

    /// Hold this while evaluating anything against this runtime.
    pub(crate) fn lock_exec(&self) -> MutexGuard<'_, ()> {
        self.exec.lock()
    }

    // ── Execution ──────────────────────────────────────────────

    /// Evaluate `program` in a fresh child of the global scope and return the
    /// value of its last statement.
    pub fn exec_program(&self, program: &Program) -> Result<Value> {
        let _guard = self.lock_exec();
        let scope = Scope::child(&self.globals);
        let mut ev = Evaluator::new(self, scope);
        let result = ev.exec_statements(&program.statements);
        debug!(statements = program.len(), ok = result.is_ok(), "program executed");
        result
    }

    /// Run a JSON program file; the runtime keeps whatever it declared globally.
    pub fn exec_file(&self, path: &Path) -> Result<Value> {
        let raw = std::fs::read_to_string(path)?;
        let program = Program::from_json(&raw)?;
        info!(path = %path.display(), statements = program.len(), "executing program file");
        self.exec_program(&program)
    }

    /// Call a closure value from host code.
    pub fn call(&self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        let closure = callee.expect_closure("call")?;
        let _guard = self.lock_exec();
        let mut ev = Evaluator::new(self, Arc::clone(&self.globals));
        ev.call_closure(&closure, args)
    }

    // ── Globals ────────────────────────────────────────────────

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get_local(name)
    }

    pub fn declare_global(&self, name: &str, tag: TypeTag, value: Value) -> Result<()> {
        self.globals.declare(name, ScopeEntry::typed(value, tag))
    }

    /// User-visible global names, sorted, without the built-in constants.
    pub fn list_global_variables(&self) -> Vec<String> {
        self.globals
            .names()
            .into_iter()
            .filter(|n| !CONSTANTS.contains(&n.as_str()))
            .collect()
    }

    // ── Host registries ────────────────────────────────────────

    pub fn register_object(&self, name: &str, object: Arc<dyn HostObject>) {
        self.objects.write().insert(name.to_string(), object);
    }

    pub fn object(&self, name: &str) -> Option<Arc<dyn HostObject>> {
        self.objects.read().get(name).cloned()
    }

    pub fn register_collection(&self, name: &str, value: Value) {
        self.collections.write().insert(name.to_string(), value);
    }

    pub fn collection(&self, name: &str) -> Option<Value> {
        self.collections.read().get(name).cloned()
    }

    pub fn register_node(&self, name: &str, node: TreeRef) {
        self.nodes.write().insert(name.to_string(), node);
    }

    pub fn node(&self, name: &str) -> Option<TreeRef> {
        self.nodes.read().get(name).cloned()
    }

    // ── Session cloning ────────────────────────────────────────

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            globals: self.globals.snapshot(),
            objects: self.objects.read().clone(),
            collections: self.collections.read().clone(),
            nodes: self.nodes.read().clone(),
        }
    }

    /// Copy every binding of `snapshot` into this runtime. Values are copied
    /// by reference; later rebinding on either side is not seen by the other.
    pub fn import_snapshot(&self, snapshot: RuntimeSnapshot) {
        for (name, entry) in snapshot.globals {
            if CONSTANTS.contains(&name.as_str()) {
                continue;
            }
            // Entries were valid where they came from.
            let _ = self.globals.declare(&name, entry);
        }
        self.objects.write().extend(snapshot.objects);
        self.collections.write().extend(snapshot.collections);
        self.nodes.write().extend(snapshot.nodes);
    }

    /// New runtime sharing this one's registry, sink, and agent manager, seeded
    /// with a snapshot of its current globals and host registries.
    pub fn clone_for_session(&self) -> Arc<Runtime> {
        let clone = Runtime::builder()
            .registry(Arc::clone(&self.registry))
            .sink(Arc::clone(&self.sink))
            .agents(self.agents.clone())
            .build();
        clone.import_snapshot(self.snapshot());
        clone
    }
}
