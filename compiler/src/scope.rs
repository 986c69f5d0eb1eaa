//! Per-scope compilation.
//!
//! A [`CompileCtx`] lowers the roots of one scope (the top-level circuit or
//! one function body) into a gate stream. It owns the scope's wire
//! allocator and all label bookkeeping; the shared [`Dag`] only stores
//! structure and reference counts, so the same arena serves every scope.

use ir::{EvalError, FieldId, FuncRef, Gate};
use memory::{Field, WireAllocator, WireRange};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::dag::{Bundle, CallArg, Dag, Evaluator, Expr, NodeKind, ScopeTag};

// ============================================================================
// Scope roots
// ============================================================================

/// Handle to a per-field builder within one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Backend {
    pub(crate) scope: ScopeTag,
    pub(crate) slot: usize,
    pub(crate) field: FieldId,
}

impl Backend {
    pub fn field_id(&self) -> FieldId {
        self.field
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Root {
    /// Terminal assertion node.
    Assert(Expr),
    /// Node kept alive until the scope is compiled; holds one reference.
    Live(Expr),
}

impl Root {
    fn expr(self) -> Expr {
        match self {
            Root::Assert(e) | Root::Live(e) => e,
        }
    }
}

#[derive(Debug)]
pub(crate) struct BackendSlot {
    pub field_id: FieldId,
    pub field: Field,
    pub roots: Vec<Root>,
}

/// The backends of one scope, in creation order.
#[derive(Debug)]
pub struct Scope {
    pub(crate) tag: ScopeTag,
    pub(crate) backends: Vec<BackendSlot>,
    pruned: bool,
}

impl Scope {
    pub(crate) fn new(tag: ScopeTag) -> Self {
        Self {
            tag,
            backends: Vec::new(),
            pruned: false,
        }
    }

    pub(crate) fn add_backend(&mut self, field_id: FieldId, field: Field) -> Backend {
        assert!(
            !self.backends.iter().any(|b| b.field_id == field_id),
            "scope {:?} already has a backend for field {field_id}",
            self.tag
        );
        self.backends.push(BackendSlot {
            field_id,
            field,
            roots: Vec::new(),
        });
        Backend {
            scope: self.tag,
            slot: self.backends.len() - 1,
            field: field_id,
        }
    }

    pub(crate) fn slot_mut(&mut self, bf: Backend) -> &mut BackendSlot {
        assert_eq!(bf.scope, self.tag, "backend of scope {:?} used in scope {:?}", bf.scope, self.tag);
        &mut self.backends[bf.slot]
    }

    pub(crate) fn has_roots(&self) -> bool {
        self.backends.iter().any(|b| !b.roots.is_empty())
    }

    fn roots(&self) -> impl Iterator<Item = Root> + '_ {
        self.backends.iter().flat_map(|b| b.roots.iter().copied())
    }

    pub(crate) fn root_exprs(&self) -> impl Iterator<Item = Expr> + '_ {
        self.roots().map(Root::expr)
    }

    /// Nodes of this scope that neither a root nor `extra` depends on are
    /// never compiled. Release the references they hold on their operands
    /// so shared operands are freed as soon as their last compiled consumer
    /// is emitted. Only the first call has an effect.
    pub(crate) fn prune(&mut self, dag: &mut Dag, extra: impl IntoIterator<Item = Expr>) {
        if self.pruned {
            return;
        }
        self.pruned = true;

        let mut reachable = FxHashSet::default();
        let mut work: Vec<Expr> = self.root_exprs().chain(extra).collect();
        while let Some(e) = work.pop() {
            if reachable.insert(e) {
                work.extend(dag.deps(e));
            }
        }

        let dangling: Vec<Expr> = dag.scope_nodes(self.tag).filter(|e| !reachable.contains(e)).collect();
        for e in dangling {
            let children = dag.node(e).children.clone();
            for child in children {
                let node = dag.node_mut(child);
                assert!(node.refs > 0, "prune of node {e} found operand {child} with no references");
                node.refs -= 1;
            }
        }
    }
}

// ============================================================================
// CompileCtx
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Wire(u64),
    /// Emitted, but produces no single wire (assertions and calls).
    Done,
}

/// Compilation state of one scope.
#[derive(Debug)]
pub(crate) struct CompileCtx {
    pub ns: WireAllocator,
    pub gates: Vec<Gate>,
    labels: FxHashMap<Expr, Label>,
    /// Wires allocated for (and freed with) a node.
    owned: FxHashMap<Expr, u64>,
    /// First label of every bundle visible in this scope.
    bundle_base: FxHashMap<u32, u64>,
    function_names: Vec<String>,
}

impl CompileCtx {
    /// `function_names` maps function indices to emitted names for call gates.
    pub fn new(offset: u64, function_names: Vec<String>) -> Self {
        Self {
            ns: WireAllocator::new(offset),
            gates: Vec::new(),
            labels: FxHashMap::default(),
            owned: FxHashMap::default(),
            bundle_base: FxHashMap::default(),
            function_names,
        }
    }

    pub fn bind_bundle(&mut self, bundle: Bundle, base: u64) {
        self.bundle_base.insert(bundle.id, base);
    }

    fn emit(&mut self, gate: Gate) {
        trace!(gate = ?gate, "emit");
        self.gates.push(gate);
    }

    /// `dst <- src`, for values that already live on another wire.
    pub fn emit_copy(&mut self, field: FieldId, dst: u64, src: u64) {
        self.emit(Gate::Copy {
            field,
            dst: WireRange::single(dst),
            srcs: vec![src],
        });
    }

    fn wire(&self, e: Expr) -> u64 {
        match self.labels.get(&e) {
            Some(Label::Wire(w)) => *w,
            Some(Label::Done) => panic!("node {e} produces no single wire"),
            None => panic!("node {e} used before it was compiled"),
        }
    }

    /// Label for the result of `e`: the caller's destination, or a fresh
    /// wire owned by the node.
    fn output_wire(&mut self, e: Expr, into: Option<u64>) -> u64 {
        let w = match into {
            Some(w) => w,
            None => {
                let w = self.ns.allocate_one();
                self.owned.insert(e, w);
                w
            }
        };
        self.labels.insert(e, Label::Wire(w));
        w
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    /// Compile `root` and every dependency not yet emitted in this scope.
    ///
    /// `into` asks for the root's value to be written to a fixed label; it
    /// is a request, not a guarantee: inputs and already compiled nodes keep
    /// their label. Returns the root's label, or `None` for assertions.
    pub fn compile(&mut self, ev: &mut Evaluator<'_>, root: Expr, into: Option<u64>) -> Result<Option<u64>, EvalError> {
        let mut stack = vec![(root, false)];
        while let Some((e, expanded)) = stack.pop() {
            if self.labels.contains_key(&e) {
                continue;
            }
            if !expanded {
                stack.push((e, true));
                for dep in ev.dag().deps(e).into_iter().rev() {
                    if !self.labels.contains_key(&dep) {
                        stack.push((dep, false));
                    }
                }
                continue;
            }
            let target = if e == root { into } else { None };
            self.compile_node(ev, e, target)?;
        }

        Ok(match self.labels.get(&root) {
            Some(Label::Wire(w)) => Some(*w),
            _ => None,
        })
    }

    /// Emit one node whose dependencies are all compiled.
    fn compile_node(&mut self, ev: &mut Evaluator<'_>, e: Expr, into: Option<u64>) -> Result<(), EvalError> {
        let node = ev.dag().node(e);
        let field = node.field;
        let children = node.children.clone();
        let kind = node.kind.clone();

        match kind {
            NodeKind::Add => {
                let (out, lhs, rhs) = self.binary(e, &children, into);
                let field = expect_field(field, e);
                self.emit(Gate::Add { field, out, lhs, rhs });
            }
            NodeKind::Mul => {
                let (out, lhs, rhs) = self.binary(e, &children, into);
                let field = expect_field(field, e);
                self.emit(Gate::Mul { field, out, lhs, rhs });
            }
            NodeKind::AddConst(constant) => {
                let input = self.wire(children[0]);
                let out = self.output_wire(e, into);
                self.emit(Gate::AddConst {
                    field: expect_field(field, e),
                    out,
                    input,
                    constant,
                });
            }
            NodeKind::MulConst(constant) => {
                let input = self.wire(children[0]);
                let out = self.output_wire(e, into);
                self.emit(Gate::MulConst {
                    field: expect_field(field, e),
                    out,
                    input,
                    constant,
                });
            }
            NodeKind::Witness => {
                let value = ev.value(e)?;
                let out = self.output_wire(e, into);
                self.emit(Gate::Witness {
                    field: expect_field(field, e),
                    out,
                    value,
                });
            }
            NodeKind::Public(value) => {
                let out = self.output_wire(e, into);
                self.emit(Gate::Public {
                    field: expect_field(field, e),
                    out,
                    value,
                });
            }
            NodeKind::Input { bundle, index } => {
                let Some(base) = self.bundle_base.get(&bundle) else {
                    panic!("input {e} reads a wire bundle that is not visible in this scope");
                };
                self.labels.insert(e, Label::Wire(base + index));
            }
            NodeKind::AssertZero => {
                let wire = self.wire(children[0]);
                self.emit(Gate::AssertZero {
                    field: expect_field(field, e),
                    wire,
                });
                self.labels.insert(e, Label::Done);
                self.unref(ev.dag(), children[0]);
            }
            NodeKind::Call { func, args, outputs } => {
                self.compile_call(ev.dag(), e, func, &args, &outputs);
            }
        }
        Ok(())
    }

    fn binary(&mut self, e: Expr, children: &[Expr], into: Option<u64>) -> (u64, u64, u64) {
        let (lhs, rhs) = (self.wire(children[0]), self.wire(children[1]));
        (self.output_wire(e, into), lhs, rhs)
    }

    fn compile_call(&mut self, dag: &mut Dag, e: Expr, func: usize, args: &[CallArg], outputs: &[Bundle]) {
        let mut arg_ranges = Vec::with_capacity(args.len());
        let mut scratch = Vec::new();
        for arg in args {
            let exprs = arg.exprs();
            let labels: Vec<u64> = exprs.iter().map(|x| self.wire(*x)).collect();
            if is_contiguous(&labels) {
                arg_ranges.push(WireRange::new(labels[0], labels[0] + labels.len() as u64));
            } else {
                let dst = self.ns.allocate(labels.len() as u64);
                self.emit(Gate::Copy {
                    field: dag.field_of(exprs[0]),
                    dst,
                    srcs: labels,
                });
                arg_ranges.push(dst);
                scratch.push(dst);
            }
        }

        // outputs are taken before the arguments are released so a call
        // never writes into its own inputs
        let mut out_ranges = Vec::with_capacity(outputs.len());
        for bundle in outputs {
            let range = self.ns.allocate(bundle.len);
            self.bind_bundle(*bundle, range.start);
            out_ranges.push(range);
        }

        let name = self
            .function_names
            .get(func)
            .cloned()
            .unwrap_or_else(|| panic!("call to undeclared function #{func}"));
        self.emit(Gate::Call {
            func: FuncRef { index: func, name },
            outputs: out_ranges,
            args: arg_ranges,
        });
        self.labels.insert(e, Label::Done);

        for range in scratch {
            self.ns.free(range);
        }
        let children = dag.node(e).children.clone();
        for child in children {
            self.unref(dag, child);
        }
    }

    // ========================================================================
    // Release
    // ========================================================================

    /// Drop one reference to `e`. A node reaching zero frees its wire,
    /// forgets its label and releases its operands in turn.
    pub fn unref(&mut self, dag: &mut Dag, e: Expr) {
        let mut work = vec![e];
        while let Some(e) = work.pop() {
            let node = dag.node_mut(e);
            assert!(
                !matches!(node.kind, NodeKind::Call { .. }),
                "call node {e} is never released through unref"
            );
            assert!(node.refs > 0, "unref of node {e} whose count is already zero");
            node.refs -= 1;
            if node.refs > 0 {
                continue;
            }
            work.extend(node.children.iter().rev());
            self.labels.remove(&e);
            if let Some(w) = self.owned.remove(&e) {
                self.ns.free_one(w);
            }
        }
    }

    /// Compile every root of `scope` in backend order.
    pub fn compile_roots(&mut self, ev: &mut Evaluator<'_>, scope: &Scope) -> Result<(), EvalError> {
        for root in scope.roots() {
            self.compile(ev, root.expr(), None)?;
        }
        Ok(())
    }

    /// Release the references taken by `live` roots.
    pub fn release_live(&mut self, dag: &mut Dag, scope: &Scope) {
        for root in scope.roots() {
            if let Root::Live(e) = root {
                self.unref(dag, e);
            }
        }
    }
}

fn expect_field(field: Option<FieldId>, e: Expr) -> FieldId {
    field.unwrap_or_else(|| panic!("node {e} has no field"))
}

/// Strictly consecutive labels can be passed as a range without copying.
fn is_contiguous(labels: &[u64]) -> bool {
    labels.windows(2).all(|w| w[1] == w[0] + 1)
}

#[cfg(test)]
mod tests {
    use ir::{EvalError, FieldId, Gate};
    use memory::{Field, FieldElement};

    use super::{is_contiguous, CompileCtx};
    use crate::dag::{Dag, Evaluator, Expr, NodeKind, ScopeTag, WitnessFn};
    use crate::function::Callee;
    use crate::plugin::PluginRegistry;

    const TOP: ScopeTag = ScopeTag::Top;

    fn witness(dag: &mut Dag, value: u64) -> Expr {
        let f = Field::new(97u32);
        let compute: WitnessFn =
            Box::new(move |_: &mut Evaluator<'_>| -> Result<FieldElement, EvalError> { Ok(f.from_u64(value)) });
        dag.push_witness(TOP, FieldId(0), compute)
    }

    #[test]
    fn test_contiguity() {
        assert!(is_contiguous(&[7]));
        assert!(is_contiguous(&[7, 8, 9]));
        assert!(!is_contiguous(&[9, 7, 8]));
        assert!(!is_contiguous(&[7, 9]));
        assert!(!is_contiguous(&[7, 7]));
    }

    #[test]
    fn test_node_compiles_once() {
        let plugins = PluginRegistry::default();
        let mut dag = Dag::default();
        let x = witness(&mut dag, 5);
        let sq = dag.push(TOP, Some(FieldId(0)), NodeKind::Mul, vec![x, x]);

        let mut ctx = CompileCtx::new(0, Vec::new());
        let mut ev = Evaluator::new(&mut dag, Callee::new(&[], &plugins));
        let first = ctx.compile(&mut ev, sq, None).unwrap();
        assert_eq!(first, Some(1));
        assert_eq!(ctx.gates.len(), 2);

        let again = ctx.compile(&mut ev, sq, None).unwrap();
        assert_eq!(again, first);
        assert_eq!(ctx.gates.len(), 2);
        let muls = ctx.gates.iter().filter(|g| matches!(g, Gate::Mul { .. })).count();
        assert_eq!(muls, 1);
        // operands compiled on the way are cached too
        assert_eq!(ctx.compile(&mut ev, x, None).unwrap(), Some(0));
        assert_eq!(ctx.gates.len(), 2);
    }

    #[test]
    fn test_unref_frees_at_zero() {
        let plugins = PluginRegistry::default();
        let mut dag = Dag::default();
        let x = witness(&mut dag, 2);
        let y = dag.push(TOP, Some(FieldId(0)), NodeKind::Add, vec![x, x]);
        dag.retain(y);

        let mut ctx = CompileCtx::new(0, Vec::new());
        let mut ev = Evaluator::new(&mut dag, Callee::new(&[], &plugins));
        ctx.compile(&mut ev, y, None).unwrap();
        assert_eq!(ctx.ns.allocated_count(), 2);

        ctx.unref(ev.dag(), y);
        assert_eq!(ctx.ns.allocated_count(), 0);
        assert_eq!(ev.dag().refs(x), 0);
    }

    #[test]
    #[should_panic(expected = "count is already zero")]
    fn test_unref_at_zero_panics() {
        let plugins = PluginRegistry::default();
        let mut dag = Dag::default();
        let x = witness(&mut dag, 1);

        let mut ctx = CompileCtx::new(0, Vec::new());
        let mut ev = Evaluator::new(&mut dag, Callee::new(&[], &plugins));
        ctx.compile(&mut ev, x, None).unwrap();
        ctx.unref(ev.dag(), x);
    }

    #[test]
    #[should_panic(expected = "never released through unref")]
    fn test_unref_of_call_panics() {
        let mut dag = Dag::default();
        let x = witness(&mut dag, 1);
        let (call, _) = dag.push_call(TOP, 0, vec![x.into()], &[(FieldId(0), 1)]);

        let mut ctx = CompileCtx::new(0, Vec::new());
        ctx.unref(&mut dag, call);
    }
}
