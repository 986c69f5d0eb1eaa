//! The top-level circuit: owns the expression arena, the field table, the
//! function table and the top-level scope.

use ir::{run_gates, EvalError, FieldId, FuncRef, Gate, GateEnv, WireStore};
use memory::{Field, FieldElement, WireAllocator, WireRange};
use tracing::{debug, debug_span, warn};

use crate::builder::sealed::{Parts, Sealed};
use crate::builder::FieldTable;
use crate::config::CircuitConfig;
use crate::dag::{Dag, Evaluator, ScopeTag};
use crate::error::CircuitError;
use crate::function::{Callee, FuncId, Function, FunctionBuilder};
use crate::plugin::PluginRegistry;
use crate::scope::{CompileCtx, Scope};

/// Result of compiling the top-level scope.
#[derive(Debug, Clone)]
pub struct CompiledCircuit {
    gates: Vec<Gate>,
    namespace: WireAllocator,
}

impl CompiledCircuit {
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Labels ever used by the top-level scope.
    pub fn wires(&self) -> WireRange {
        self.namespace.range()
    }

    /// The top-level allocator after every root has been released; only
    /// call results are still allocated.
    pub fn namespace(&self) -> &WireAllocator {
        &self.namespace
    }
}

/// An arithmetic circuit under construction.
///
/// Build expressions through the [`Builder`](crate::builder::Builder)
/// trait, declare functions with [`Circuit::function`], then
/// [`compile`](Circuit::compile). Compilation happens once; the circuit
/// cannot be extended afterwards.
///
/// A witness closure failing during [`compile`](Circuit::compile) or
/// [`function`](Circuit::function) leaves the arena partly lowered. The
/// circuit records that error: later `compile`, `simulate` and `function`
/// calls return [`CircuitError::Failed`], and builder operations panic.
#[derive(Debug)]
pub struct Circuit {
    config: CircuitConfig,
    dag: Dag,
    fields: FieldTable,
    functions: Vec<Function>,
    plugins: PluginRegistry,
    top: Scope,
    compiled: Option<CompiledCircuit>,
    failed: Option<EvalError>,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::with_config(CircuitConfig::default())
    }
}

impl Sealed for Circuit {
    fn parts(&mut self) -> Parts<'_> {
        assert!(self.compiled.is_none(), "circuit is already compiled and cannot be extended");
        assert!(self.failed.is_none(), "circuit failed to compile and cannot be extended");
        Parts {
            dag: &mut self.dag,
            scope: &mut self.top,
            fields: &mut self.fields,
            callee: Callee::new(&self.functions, &self.plugins),
        }
    }
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CircuitConfig) -> Self {
        Self {
            config,
            dag: Dag::default(),
            fields: FieldTable::default(),
            functions: Vec::new(),
            plugins: PluginRegistry::default(),
            top: Scope::new(ScopeTag::Top),
            compiled: None,
            failed: None,
        }
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    pub fn field_id(&self, field: &Field) -> Option<FieldId> {
        self.fields.lookup(field)
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function_ref(&self, func: FuncId) -> &Function {
        &self.functions[func.0]
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Declare and compile a function named `name`.
    pub fn function<F>(&mut self, name: &str, define: F) -> Result<FuncId, CircuitError>
    where
        F: FnOnce(&mut FunctionBuilder<'_>),
    {
        assert!(
            !self.functions.iter().any(|f| f.name() == name),
            "function `{name}` declared twice"
        );
        assert!(self.compiled.is_none(), "circuit is already compiled and cannot be extended");
        self.check_failed()?;

        let index = self.functions.len();
        let callee = Callee::new(&self.functions, &self.plugins);
        let mut fb = FunctionBuilder::new(name.to_string(), index, &mut self.dag, &mut self.fields, callee);
        define(&mut fb);
        let function = match fb.finish() {
            Ok(function) => function,
            Err(err) => return Err(self.fail(err)),
        };

        self.functions.push(function);
        Ok(FuncId(index))
    }

    /// Declare a function under the next free `f<n>` name.
    pub fn anonymous_function<F>(&mut self, define: F) -> Result<FuncId, CircuitError>
    where
        F: FnOnce(&mut FunctionBuilder<'_>),
    {
        let name = format!("f{}", self.functions.len());
        self.function(&name, define)
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    /// Compile the top-level scope. Later calls return the cached result,
    /// or [`CircuitError::Failed`] if an earlier attempt failed.
    pub fn compile(&mut self) -> Result<&CompiledCircuit, CircuitError> {
        self.check_failed()?;
        let compiled = match self.compiled.take() {
            Some(compiled) => compiled,
            None => match self.compile_top() {
                Ok(compiled) => compiled,
                Err(err) => return Err(self.fail(err)),
            },
        };
        let compiled: &CompiledCircuit = self.compiled.insert(compiled);
        Ok(compiled)
    }

    /// The cached compilation result, if [`compile`](Circuit::compile) ran.
    pub fn compiled(&self) -> Option<&CompiledCircuit> {
        self.compiled.as_ref()
    }

    /// The error that left this circuit unusable, if any.
    pub fn failure(&self) -> Option<&EvalError> {
        self.failed.as_ref()
    }

    fn check_failed(&self) -> Result<(), CircuitError> {
        match &self.failed {
            Some(err) => Err(CircuitError::Failed(err.clone())),
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: EvalError) -> CircuitError {
        warn!(error = %err, "circuit compilation failed");
        self.failed = Some(err.clone());
        CircuitError::Eval(err)
    }

    fn compile_top(&mut self) -> Result<CompiledCircuit, EvalError> {
        let span = debug_span!("compile_circuit");
        let _enter = span.enter();

        self.top.prune(&mut self.dag, std::iter::empty());
        let callee = Callee::new(&self.functions, &self.plugins);
        let mut ctx = CompileCtx::new(self.config.wire_offset, callee.names());
        let mut ev = Evaluator::new(&mut self.dag, callee);
        ctx.compile_roots(&mut ev, &self.top)?;
        ctx.release_live(ev.dag(), &self.top);

        let compiled = CompiledCircuit {
            gates: ctx.gates,
            namespace: ctx.ns,
        };
        debug!(
            gates = compiled.gates.len(),
            wires = compiled.wires().len(),
            functions = self.functions.len(),
            "circuit compiled"
        );
        Ok(compiled)
    }

    /// Compile (if needed) and replay the top-level gate stream, checking
    /// every assertion. Returns the final wire assignment.
    pub fn simulate(&mut self) -> Result<WireStore, CircuitError> {
        self.compile()?;
        let mut store = WireStore::new();
        if let Some(compiled) = &self.compiled {
            let mut env = TopEnv {
                callee: Callee::new(&self.functions, &self.plugins),
            };
            run_gates(&compiled.gates, &mut store, &mut env)?;
        }
        Ok(store)
    }

    /// Evaluate a declared function directly.
    pub fn evaluate_function(
        &self,
        func: FuncId,
        args: Vec<Vec<FieldElement>>,
    ) -> Result<Vec<Vec<FieldElement>>, CircuitError> {
        let callee = Callee::new(&self.functions, &self.plugins);
        Ok(callee.call(func.0, args)?)
    }
}

/// Top-level replay: witness and public gates load their recorded values.
struct TopEnv<'a> {
    callee: Callee<'a>,
}

impl GateEnv for TopEnv<'_> {
    fn call(&mut self, func: &FuncRef, args: Vec<Vec<FieldElement>>) -> Result<Vec<Vec<FieldElement>>, EvalError> {
        self.callee.call(func.index, args)
    }
}
