//! Expression DAG arena.
//!
//! Every expression built through a [`Builder`](crate::builder::Builder) is a
//! node in one arena owned by the circuit. Nodes are addressed by [`Expr`]
//! handles and keep a reference count of incoming edges; the per-scope
//! compiler uses that count to free a node's wire as soon as its last
//! consumer has been emitted.
//!
//! The arena also memoizes simulation values: [`Evaluator`] walks the DAG
//! iteratively and stores one value per node (and one tuple list per call).

use std::fmt;

use ir::{EvalError, FieldId};
use memory::FieldElement;
use rustc_hash::FxHashMap;

use crate::function::Callee;

// ============================================================================
// Handles
// ============================================================================

/// Handle to a node of the expression DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Expr(pub(crate) u32);

impl Expr {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Handle to a group of consecutive wires sharing one lifetime: a function
/// input, or one output of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bundle {
    pub(crate) id: u32,
    pub(crate) field: FieldId,
    pub(crate) len: u64,
}

impl Bundle {
    pub fn field(&self) -> FieldId {
        self.field
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Which compilation scope built a node or owns a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeTag {
    Top,
    /// Body of the function with this index in the circuit's table.
    Function(usize),
}

// ============================================================================
// Nodes
// ============================================================================

/// One positional argument of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// A single wire, matching a width-1 input.
    Single(Expr),
    /// One expression per wire of the input range.
    Tuple(Vec<Expr>),
}

impl CallArg {
    pub(crate) fn exprs(&self) -> &[Expr] {
        match self {
            CallArg::Single(e) => std::slice::from_ref(e),
            CallArg::Tuple(es) => es,
        }
    }
}

impl From<Expr> for CallArg {
    fn from(e: Expr) -> Self {
        CallArg::Single(e)
    }
}

impl From<Vec<Expr>> for CallArg {
    fn from(es: Vec<Expr>) -> Self {
        CallArg::Tuple(es)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Add,
    Mul,
    AddConst(FieldElement),
    MulConst(FieldElement),
    AssertZero,
    /// Private input; the closure lives in `Dag::witnesses` until first use.
    Witness,
    Public(FieldElement),
    /// Wire `index` of a bundle.
    Input { bundle: u32, index: u64 },
    Call {
        func: usize,
        args: Vec<CallArg>,
        outputs: Vec<Bundle>,
    },
}

#[derive(Debug)]
pub(crate) struct Node {
    pub scope: ScopeTag,
    /// `None` only for call nodes, which produce several bundles.
    pub field: Option<FieldId>,
    pub kind: NodeKind,
    /// Operand edges, one reference each (duplicates included).
    pub children: Vec<Expr>,
    pub refs: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum BundleKind {
    /// Input of the function with this index.
    Arg(usize),
    /// Output `index` of a call node.
    CallOutput { call: Expr, index: usize },
}

/// Lazily evaluated private input.
pub type WitnessFn = Box<dyn FnOnce(&mut Evaluator<'_>) -> Result<FieldElement, EvalError>>;

// ============================================================================
// Arena
// ============================================================================

#[derive(Default)]
pub struct Dag {
    nodes: Vec<Node>,
    bundles: Vec<BundleKind>,
    witnesses: FxHashMap<Expr, WitnessFn>,
    values: FxHashMap<Expr, FieldElement>,
    call_values: FxHashMap<Expr, Vec<Vec<FieldElement>>>,
}

impl fmt::Debug for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dag")
            .field("nodes", &self.nodes.len())
            .field("bundles", &self.bundles.len())
            .field("evaluated", &self.values.len())
            .finish()
    }
}

impl Dag {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Current reference count of a node.
    pub fn refs(&self, e: Expr) -> u32 {
        self.node(e).refs
    }

    pub(crate) fn node(&self, e: Expr) -> &Node {
        &self.nodes[e.index()]
    }

    pub(crate) fn node_mut(&mut self, e: Expr) -> &mut Node {
        &mut self.nodes[e.index()]
    }

    pub(crate) fn field_of(&self, e: Expr) -> FieldId {
        match self.node(e).field {
            Some(field) => field,
            None => panic!("call node {e} has no single value"),
        }
    }

    pub(crate) fn bundle_kind(&self, bundle: Bundle) -> BundleKind {
        self.bundles[bundle.id as usize]
    }

    fn next_id(&self) -> Expr {
        let id = u32::try_from(self.nodes.len()).unwrap_or_else(|_| panic!("expression arena exhausted"));
        Expr(id)
    }

    /// Append a node, taking one reference on every child edge.
    pub(crate) fn push(&mut self, scope: ScopeTag, field: Option<FieldId>, kind: NodeKind, children: Vec<Expr>) -> Expr {
        for &child in &children {
            let node = &mut self.nodes[child.index()];
            assert_eq!(
                node.scope, scope,
                "expression {child} was built in scope {:?} and cannot be used in {scope:?}",
                node.scope
            );
            node.refs += 1;
        }
        let id = self.next_id();
        self.nodes.push(Node {
            scope,
            field,
            kind,
            children,
            refs: 0,
        });
        id
    }

    pub(crate) fn push_witness(&mut self, scope: ScopeTag, field: FieldId, f: WitnessFn) -> Expr {
        let id = self.push(scope, Some(field), NodeKind::Witness, Vec::new());
        self.witnesses.insert(id, f);
        id
    }

    pub(crate) fn new_bundle(&mut self, kind: BundleKind, field: FieldId, len: u64) -> Bundle {
        assert!(len > 0, "wire bundles hold at least one wire");
        let id = u32::try_from(self.bundles.len()).unwrap_or_else(|_| panic!("bundle table exhausted"));
        self.bundles.push(kind);
        Bundle { id, field, len }
    }

    /// Append a call node and one bundle per declared output.
    pub(crate) fn push_call(
        &mut self,
        scope: ScopeTag,
        func: usize,
        args: Vec<CallArg>,
        outputs: &[(FieldId, u64)],
    ) -> (Expr, Vec<Bundle>) {
        let call = self.next_id();
        let bundles: Vec<Bundle> = outputs
            .iter()
            .enumerate()
            .map(|(index, &(field, len))| self.new_bundle(BundleKind::CallOutput { call, index }, field, len))
            .collect();
        let children = args.iter().flat_map(|a| a.exprs().iter().copied()).collect();
        let kind = NodeKind::Call {
            func,
            args,
            outputs: bundles.clone(),
        };
        let id = self.push(scope, None, kind, children);
        debug_assert_eq!(id, call);
        (id, bundles)
    }

    /// Nodes built in scope `tag`, in creation order.
    pub(crate) fn scope_nodes(&self, tag: ScopeTag) -> impl Iterator<Item = Expr> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.scope == tag)
            .map(|(i, _)| Expr(i as u32))
    }

    /// Take an extra reference on a node (roots and output assignments).
    pub(crate) fn retain(&mut self, e: Expr) {
        self.node_mut(e).refs += 1;
    }

    /// Nodes that must be compiled or evaluated before `e`.
    pub(crate) fn deps(&self, e: Expr) -> Vec<Expr> {
        let node = self.node(e);
        match &node.kind {
            NodeKind::Input { bundle, .. } => match self.bundles[*bundle as usize] {
                BundleKind::CallOutput { call, .. } => vec![call],
                BundleKind::Arg(_) => Vec::new(),
            },
            _ => node.children.clone(),
        }
    }

    fn is_evaluated(&self, e: Expr) -> bool {
        self.values.contains_key(&e) || self.call_values.contains_key(&e)
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// Simulation access to the DAG, handed to witness closures.
pub struct Evaluator<'a> {
    dag: &'a mut Dag,
    callee: Callee<'a>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(dag: &'a mut Dag, callee: Callee<'a>) -> Self {
        Self { dag, callee }
    }

    pub(crate) fn dag(&mut self) -> &mut Dag {
        self.dag
    }

    /// Value of `e`, computing (and caching) it and everything it depends on.
    pub fn value(&mut self, e: Expr) -> Result<FieldElement, EvalError> {
        assert!(
            !matches!(self.dag.node(e).kind, NodeKind::Call { .. }),
            "call node {e} has no single value"
        );
        self.force(e)?;
        Ok(self.dag.values[&e].clone())
    }

    /// Post-order walk computing `root` and its unevaluated dependencies.
    fn force(&mut self, root: Expr) -> Result<(), EvalError> {
        let mut stack = vec![(root, false)];
        while let Some((e, expanded)) = stack.pop() {
            if self.dag.is_evaluated(e) {
                continue;
            }
            if !expanded {
                stack.push((e, true));
                for dep in self.dag.deps(e).into_iter().rev() {
                    if !self.dag.is_evaluated(dep) {
                        stack.push((dep, false));
                    }
                }
                continue;
            }
            self.compute(e)?;
        }
        Ok(())
    }

    /// Compute one node whose dependencies are all evaluated.
    fn compute(&mut self, e: Expr) -> Result<(), EvalError> {
        let node = self.dag.node(e);
        let children = node.children.clone();
        let operand = |dag: &Dag, i: usize| dag.values[&children[i]].clone();

        let value = match node.kind.clone() {
            NodeKind::Add => operand(self.dag, 0).add(&operand(self.dag, 1)),
            NodeKind::Mul => operand(self.dag, 0).mul(&operand(self.dag, 1)),
            NodeKind::AddConst(c) => operand(self.dag, 0).add(&c),
            NodeKind::MulConst(c) => operand(self.dag, 0).mul(&c),
            NodeKind::AssertZero => operand(self.dag, 0),
            NodeKind::Public(v) => v,
            NodeKind::Witness => {
                let Some(f) = self.dag.witnesses.remove(&e) else {
                    panic!("witness {e} evaluated while its own closure was running");
                };
                f(self)?
            }
            NodeKind::Input { bundle, index } => match self.dag.bundles[bundle as usize] {
                BundleKind::Arg(func) => {
                    panic!("input {e} of function #{func} has no value outside a call")
                }
                BundleKind::CallOutput { call, index: out } => self.dag.call_values[&call][out][index as usize].clone(),
            },
            NodeKind::Call { func, args, .. } => {
                let arg_values = args
                    .iter()
                    .map(|arg| arg.exprs().iter().map(|x| self.dag.values[x].clone()).collect())
                    .collect();
                let results = self.callee.call(func, arg_values)?;
                self.dag.call_values.insert(e, results);
                return Ok(());
            }
        };
        self.dag.values.insert(e, value);
        Ok(())
    }
}
