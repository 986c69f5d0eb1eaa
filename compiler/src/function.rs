//! Functions: named, separately compiled sub-circuits.
//!
//! A function body is built with a [`FunctionBuilder`] and compiled at once
//! in its own scope. Its wire space is laid out as
//!
//! ```text
//! [ outputs | inputs | internal wires ... )
//! 0
//! ```
//!
//! so a call only has to bind argument and result ranges to those fixed
//! labels. A function may instead delegate to a plugin, in which case it has
//! no body and is evaluated by the plugin.

use std::fmt;

use ir::{run_gates, EvalError, FieldId, FuncRef, Gate, GateEnv, WireStore};
use memory::{FieldElement, WireRange};
use tracing::{debug, debug_span};

use crate::builder::sealed::{Parts, Sealed};
use crate::builder::FieldTable;
use crate::dag::{Bundle, BundleKind, Dag, Evaluator, Expr, ScopeTag};
use crate::plugin::{PluginArg, PluginRegistry};
use crate::scope::{Backend, CompileCtx, Scope};

/// Handle to a function declared in a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub(crate) usize);

impl FuncId {
    pub fn index(self) -> usize {
        self.0
    }
}

// ============================================================================
// Function
// ============================================================================

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Gates {
        gates: Vec<Gate>,
        /// Labels ever used by the body, outputs and inputs included.
        wires: WireRange,
    },
    Plugin { name: String, args: Vec<PluginArg> },
}

/// A compiled function.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    inputs: Vec<(FieldId, u64)>,
    outputs: Vec<(FieldId, u64)>,
    body: FunctionBody,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `(field, width)` of every input, in order.
    pub fn inputs(&self) -> &[(FieldId, u64)] {
        &self.inputs
    }

    /// `(field, width)` of every output, in order.
    pub fn outputs(&self) -> &[(FieldId, u64)] {
        &self.outputs
    }

    pub fn body(&self) -> &FunctionBody {
        &self.body
    }

    pub fn gates(&self) -> &[Gate] {
        match &self.body {
            FunctionBody::Gates { gates, .. } => gates,
            FunctionBody::Plugin { .. } => &[],
        }
    }

    /// Label ranges of the outputs followed by the inputs.
    fn layout(&self) -> (Vec<WireRange>, Vec<WireRange>) {
        let mut next = 0;
        let mut take = |ports: &[(FieldId, u64)]| {
            ports
                .iter()
                .map(|(_, n)| {
                    let r = WireRange::new(next, next + n);
                    next = r.end;
                    r
                })
                .collect::<Vec<_>>()
        };
        let outputs = take(&self.outputs);
        let inputs = take(&self.inputs);
        (outputs, inputs)
    }

    /// Evaluate on one value tuple per input, returning one tuple per
    /// output.
    pub fn evaluate(&self, callee: Callee<'_>, args: Vec<Vec<FieldElement>>) -> Result<Vec<Vec<FieldElement>>, EvalError> {
        assert_eq!(
            args.len(),
            self.inputs.len(),
            "function `{}` takes {} arguments, got {}",
            self.name,
            self.inputs.len(),
            args.len()
        );
        for (i, (arg, (_, width))) in args.iter().zip(&self.inputs).enumerate() {
            assert_eq!(arg.len() as u64, *width, "argument {i} of `{}` has the wrong width", self.name);
        }

        match &self.body {
            FunctionBody::Plugin { name, args: plugin_args } => {
                callee.plugins.get(name).evaluate(plugin_args, args, callee)
            }
            FunctionBody::Gates { gates, .. } => {
                let (out_ranges, in_ranges) = self.layout();
                let mut store = WireStore::new();
                for (range, values) in in_ranges.iter().zip(args) {
                    for (w, v) in range.iter().zip(values) {
                        store.set(w, v);
                    }
                }

                let mut env = BodyEnv {
                    function: &self.name,
                    callee,
                };
                run_gates(gates, &mut store, &mut env)?;

                out_ranges
                    .iter()
                    .map(|range| range.iter().map(|w| store.get(w).cloned()).collect::<Result<Vec<_>, _>>())
                    .collect()
            }
        }
    }
}

// ============================================================================
// Callee
// ============================================================================

/// The function table and plugin registry, as needed to evaluate calls.
#[derive(Clone, Copy)]
pub struct Callee<'a> {
    pub(crate) functions: &'a [Function],
    pub(crate) plugins: &'a PluginRegistry,
}

impl fmt::Debug for Callee<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callee").field("functions", &self.functions.len()).finish()
    }
}

impl<'a> Callee<'a> {
    pub(crate) fn new(functions: &'a [Function], plugins: &'a PluginRegistry) -> Self {
        Self { functions, plugins }
    }

    pub fn function(&self, index: usize) -> &'a Function {
        match self.functions.get(index) {
            Some(f) => f,
            None => panic!("call to undeclared function #{index}"),
        }
    }

    pub fn call(&self, index: usize, args: Vec<Vec<FieldElement>>) -> Result<Vec<Vec<FieldElement>>, EvalError> {
        self.function(index).evaluate(*self, args)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name.clone()).collect()
    }
}

/// Replay environment of a function body: no inputs to load, calls recurse
/// through the function table.
struct BodyEnv<'a> {
    function: &'a str,
    callee: Callee<'a>,
}

impl GateEnv for BodyEnv<'_> {
    fn witness(&mut self, _field: FieldId, wire: u64, _recorded: &FieldElement) -> Result<FieldElement, EvalError> {
        Err(EvalError::InputInFunction {
            function: self.function.to_string(),
            wire,
        })
    }

    fn public(&mut self, _field: FieldId, wire: u64, _recorded: &FieldElement) -> Result<FieldElement, EvalError> {
        Err(EvalError::InputInFunction {
            function: self.function.to_string(),
            wire,
        })
    }

    fn call(&mut self, func: &FuncRef, args: Vec<Vec<FieldElement>>) -> Result<Vec<Vec<FieldElement>>, EvalError> {
        self.callee.call(func.index, args)
    }
}

// ============================================================================
// FunctionBuilder
// ============================================================================

/// Handle to one declared output of the function being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    slot: usize,
    field: FieldId,
    len: u64,
}

impl Output {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Builds the body of one function. Obtained from
/// [`Circuit::function`](crate::circuit::Circuit::function).
pub struct FunctionBuilder<'a> {
    name: String,
    index: usize,
    dag: &'a mut Dag,
    fields: &'a mut FieldTable,
    callee: Callee<'a>,
    scope: Scope,
    inputs: Vec<Bundle>,
    outputs: Vec<Vec<Option<Expr>>>,
    output_ports: Vec<(FieldId, u64)>,
    plugin: Option<(String, Vec<PluginArg>)>,
}

impl Sealed for FunctionBuilder<'_> {
    fn parts(&mut self) -> Parts<'_> {
        Parts {
            dag: &mut *self.dag,
            scope: &mut self.scope,
            fields: &mut *self.fields,
            callee: self.callee,
        }
    }
}

impl<'a> FunctionBuilder<'a> {
    pub(crate) fn new(
        name: String,
        index: usize,
        dag: &'a mut Dag,
        fields: &'a mut FieldTable,
        callee: Callee<'a>,
    ) -> Self {
        Self {
            name,
            index,
            dag,
            fields,
            callee,
            scope: Scope::new(ScopeTag::Function(index)),
            inputs: Vec::new(),
            outputs: Vec::new(),
            output_ports: Vec::new(),
            plugin: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare the next input: `n` wires of the backend's field.
    pub fn input(&mut self, bf: Backend, n: u64) -> Bundle {
        let field = self.scope.slot_mut(bf).field_id;
        let bundle = self.dag.new_bundle(BundleKind::Arg(self.index), field, n);
        self.inputs.push(bundle);
        bundle
    }

    /// Declare the next output: `n` wires of the backend's field.
    pub fn output(&mut self, bf: Backend, n: u64) -> Output {
        assert!(n > 0, "function `{}` declares an empty output", self.name);
        let field = self.scope.slot_mut(bf).field_id;
        self.outputs.push(vec![None; n as usize]);
        self.output_ports.push((field, n));
        Output {
            slot: self.outputs.len() - 1,
            field,
            len: n,
        }
    }

    /// Bind wire `index` of `out` to `value`.
    pub fn assign(&mut self, out: Output, index: u64, value: Expr) {
        assert!(index < out.len, "output wire {index} out of range for width {}", out.len);
        let field = self.dag.field_of(value);
        assert_eq!(field, out.field, "output of field {} assigned a value of field {field}", out.field);
        let slot = &mut self.outputs[out.slot][index as usize];
        assert!(
            slot.is_none(),
            "output {} wire {index} of function `{}` assigned twice",
            out.slot,
            self.name
        );
        *slot = Some(value);
        self.dag.retain(value);
    }

    /// Bind every wire of `out` in order.
    pub fn assign_all(&mut self, out: Output, values: &[Expr]) {
        assert_eq!(values.len() as u64, out.len, "output width mismatch");
        for (i, v) in values.iter().enumerate() {
            self.assign(out, i as u64, *v);
        }
    }

    /// Delegate this function to a plugin.
    pub fn plugin(&mut self, name: &str, args: Vec<PluginArg>) {
        assert!(self.plugin.is_none(), "function `{}` already has a plugin", self.name);
        self.plugin = Some((name.to_string(), args));
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    /// Compile the declared body into a [`Function`].
    pub(crate) fn finish(mut self) -> Result<Function, EvalError> {
        let span = debug_span!("compile_function", name = %self.name);
        let _enter = span.enter();

        let inputs: Vec<(FieldId, u64)> = self.inputs.iter().map(|b| (b.field, b.len)).collect();
        let mut function = Function {
            name: self.name,
            inputs,
            outputs: self.output_ports,
            body: FunctionBody::Gates {
                gates: Vec::new(),
                wires: WireRange::new(0, 0),
            },
        };

        if let Some((plugin, args)) = self.plugin {
            assert!(!self.scope.has_roots(), "plugin function `{}` cannot define roots", function.name);
            assert!(
                self.outputs.iter().flatten().all(Option::is_none),
                "plugin function `{}` cannot assign outputs",
                function.name
            );
            self.callee.plugins.get(&plugin).validate(&function, &args, self.callee.functions);
            debug!(function = %function.name, plugin = %plugin, "plugin function declared");
            function.body = FunctionBody::Plugin { name: plugin, args };
            return Ok(function);
        }

        let (out_ranges, in_ranges) = function.layout();
        let offset = in_ranges.last().or(out_ranges.last()).map_or(0, |r| r.end);
        let mut ctx = CompileCtx::new(offset, self.callee.names());
        for (bundle, range) in self.inputs.iter().zip(&in_ranges) {
            ctx.bind_bundle(*bundle, range.start);
        }

        let assigned = self.outputs.iter().flatten().flatten().copied();
        self.scope.prune(&mut *self.dag, assigned);

        let mut ev = Evaluator::new(self.dag, self.callee);
        ctx.compile_roots(&mut ev, &self.scope)?;

        for (k, (slots, range)) in self.outputs.iter().zip(&out_ranges).enumerate() {
            let field = function.outputs[k].0;
            for (i, slot) in slots.iter().enumerate() {
                let Some(value) = *slot else {
                    panic!("output {k} wire {i} of function `{}` is never assigned", function.name);
                };
                let target = range.nth(i as u64);
                let label = ctx.compile(&mut ev, value, Some(target))?;
                let Some(label) = label else {
                    panic!("output {k} wire {i} of function `{}` has no value", function.name);
                };
                if label != target {
                    ctx.emit_copy(field, target, label);
                }
                ctx.unref(ev.dag(), value);
            }
        }
        ctx.release_live(ev.dag(), &self.scope);

        let wires = WireRange::new(0, ctx.ns.top());
        debug!(
            function = %function.name,
            gates = ctx.gates.len(),
            wires = wires.len(),
            "function compiled"
        );
        function.body = FunctionBody::Gates { gates: ctx.gates, wires };
        Ok(function)
    }
}
