//! Builder operations shared by the top-level circuit and function bodies.
//!
//! Arithmetic over constants folds eagerly: an [`Operand`] is either a known
//! field element or an expression node, and only operations touching a node
//! grow the DAG.

use ir::{EvalError, FieldId};
use memory::{Field, FieldElement};

use crate::dag::{Bundle, BundleKind, CallArg, Dag, Evaluator, Expr, NodeKind, ScopeTag, WitnessFn};
use crate::function::FuncId;
use crate::scope::{Backend, Root};

// ============================================================================
// Operands
// ============================================================================

/// A value in a builder operation: folded constant or DAG node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Const(FieldElement),
    Expr(Expr),
}

impl Operand {
    pub fn expr(&self) -> Option<Expr> {
        match self {
            Operand::Expr(e) => Some(*e),
            Operand::Const(_) => None,
        }
    }

    pub fn constant(&self) -> Option<&FieldElement> {
        match self {
            Operand::Const(c) => Some(c),
            Operand::Expr(_) => None,
        }
    }
}

impl From<Expr> for Operand {
    fn from(e: Expr) -> Self {
        Operand::Expr(e)
    }
}

impl From<FieldElement> for Operand {
    fn from(c: FieldElement) -> Self {
        Operand::Const(c)
    }
}

impl From<&FieldElement> for Operand {
    fn from(c: &FieldElement) -> Self {
        Operand::Const(c.clone())
    }
}

// ============================================================================
// Field table
// ============================================================================

/// Fields of a circuit in first-use order; the position is the `@type`
/// index emitted in the relation.
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    fields: Vec<Field>,
}

impl FieldTable {
    /// Index of `field`, registering it on first use.
    pub fn intern(&mut self, field: &Field) -> FieldId {
        if let Some(id) = self.lookup(field) {
            return id;
        }
        self.fields.push(field.clone());
        FieldId((self.fields.len() - 1) as u32)
    }

    pub fn lookup(&self, field: &Field) -> Option<FieldId> {
        self.fields.iter().position(|f| f == field).map(|i| FieldId(i as u32))
    }

    pub fn get(&self, id: FieldId) -> &Field {
        &self.fields[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &Field)> {
        self.fields.iter().enumerate().map(|(i, f)| (FieldId(i as u32), f))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ============================================================================
// Builder
// ============================================================================

pub(crate) mod sealed {
    use crate::builder::FieldTable;
    use crate::dag::Dag;
    use crate::function::Callee;
    use crate::scope::Scope;

    /// Borrowed state a builder operates on.
    pub struct Parts<'a> {
        pub dag: &'a mut Dag,
        pub scope: &'a mut Scope,
        pub fields: &'a mut FieldTable,
        pub callee: Callee<'a>,
    }

    pub trait Sealed {
        fn parts(&mut self) -> Parts<'_>;
    }
}

/// Expression-building operations.
///
/// Implemented by [`Circuit`](crate::circuit::Circuit) for the top-level
/// scope and by [`FunctionBuilder`](crate::function::FunctionBuilder) for
/// function bodies. Every value belongs to the backend (field) it was built
/// with; mixing backends or scopes panics.
pub trait Builder: sealed::Sealed {
    /// Open a backend for `field` in this scope.
    fn backend(&mut self, field: &Field) -> Backend {
        let p = self.parts();
        let id = p.fields.intern(field);
        p.scope.add_backend(id, field.clone())
    }

    fn field(&mut self, bf: Backend) -> Field {
        self.parts().scope.slot_mut(bf).field.clone()
    }

    fn add(&mut self, bf: Backend, a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
        let (a, b) = (a.into(), b.into());
        match (a, b) {
            (Operand::Const(x), Operand::Const(y)) => Operand::Const(x.add(&y)),
            (Operand::Const(c), Operand::Expr(e)) | (Operand::Expr(e), Operand::Const(c)) => {
                Operand::Expr(node(self, bf, NodeKind::AddConst(c), vec![e]))
            }
            (Operand::Expr(x), Operand::Expr(y)) => Operand::Expr(node(self, bf, NodeKind::Add, vec![x, y])),
        }
    }

    fn mul(&mut self, bf: Backend, a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
        let (a, b) = (a.into(), b.into());
        match (a, b) {
            (Operand::Const(x), Operand::Const(y)) => Operand::Const(x.mul(&y)),
            (Operand::Const(c), Operand::Expr(e)) | (Operand::Expr(e), Operand::Const(c)) => {
                Operand::Expr(node(self, bf, NodeKind::MulConst(c), vec![e]))
            }
            (Operand::Expr(x), Operand::Expr(y)) => Operand::Expr(node(self, bf, NodeKind::Mul, vec![x, y])),
        }
    }

    fn neg(&mut self, bf: Backend, a: impl Into<Operand>) -> Operand {
        let minus_one = self.field(bf).from_i64(-1);
        self.mul(bf, a, minus_one)
    }

    /// `a - b`, lowered as `a + (-1) * b`.
    fn sub(&mut self, bf: Backend, a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
        let neg_b = self.neg(bf, b);
        self.add(bf, a, neg_b)
    }

    /// Private input computed lazily by `value`, which may evaluate other
    /// nodes through the [`Evaluator`].
    fn private<F>(&mut self, bf: Backend, value: F) -> Expr
    where
        F: FnOnce(&mut Evaluator<'_>) -> Result<FieldElement, EvalError> + 'static,
    {
        let p = self.parts();
        let field = p.scope.slot_mut(bf).field_id;
        let f: WitnessFn = Box::new(value);
        p.dag.push_witness(p.scope.tag, field, f)
    }

    /// Public input with a known value.
    fn public(&mut self, bf: Backend, value: FieldElement) -> Expr {
        node(self, bf, NodeKind::Public(value), Vec::new())
    }

    /// Constrain `a` to zero. A constant operand is checked immediately.
    fn assert_zero(&mut self, bf: Backend, a: impl Into<Operand>) {
        match a.into() {
            Operand::Const(c) => assert!(c.is_zero(), "asserting non-zero constant {c} is zero"),
            Operand::Expr(e) => {
                let root = node(self, bf, NodeKind::AssertZero, vec![e]);
                self.parts().scope.slot_mut(bf).roots.push(Root::Assert(root));
            }
        }
    }

    fn assert_eq(&mut self, bf: Backend, a: impl Into<Operand>, b: impl Into<Operand>) {
        let diff = self.sub(bf, a, b);
        self.assert_zero(bf, diff);
    }

    /// Keep `a` alive as a root of this scope: it is compiled even if
    /// nothing constrains it, and its wire stays allocated until the scope
    /// has been fully compiled.
    fn live(&mut self, bf: Backend, a: impl Into<Operand>) {
        if let Operand::Expr(e) = a.into() {
            let p = self.parts();
            check_expr(p.dag, bf, e);
            p.dag.retain(e);
            p.scope.slot_mut(bf).roots.push(Root::Live(e));
        }
    }

    /// Call `func` with one argument per declared input. Returns one bundle
    /// per declared output.
    fn call(&mut self, func: FuncId, args: Vec<CallArg>) -> Vec<Bundle> {
        let p = self.parts();
        let function = p.callee.function(func.0);
        assert_eq!(
            args.len(),
            function.inputs().len(),
            "function `{}` takes {} arguments, got {}",
            function.name(),
            function.inputs().len(),
            args.len()
        );
        for (i, (arg, (field, width))) in args.iter().zip(function.inputs()).enumerate() {
            let exprs = arg.exprs();
            if let CallArg::Single(_) = arg {
                assert_eq!(*width, 1, "argument {i} of `{}` is a single wire but the input is {width} wide", function.name());
            }
            assert_eq!(
                exprs.len() as u64,
                *width,
                "argument {i} of `{}` has {} wires, expected {width}",
                function.name(),
                exprs.len()
            );
            for x in exprs {
                assert_eq!(
                    p.dag.field_of(*x),
                    *field,
                    "argument {i} of `{}` mixes fields",
                    function.name()
                );
            }
        }
        let outputs = function.outputs().to_vec();
        let (_, bundles) = p.dag.push_call(p.scope.tag, func.0, args, &outputs);
        bundles
    }

    /// Expression for wire `index` of a bundle.
    fn wire(&mut self, bundle: Bundle, index: u64) -> Expr {
        assert!(
            index < bundle.len,
            "wire index {index} out of range for a bundle of {} wires",
            bundle.len
        );
        let p = self.parts();
        if let BundleKind::Arg(func) = p.dag.bundle_kind(bundle) {
            assert_eq!(
                p.scope.tag,
                ScopeTag::Function(func),
                "input bundle of function #{func} read outside its body"
            );
        }
        p.dag.push(
            p.scope.tag,
            Some(bundle.field),
            NodeKind::Input {
                bundle: bundle.id,
                index,
            },
            Vec::new(),
        )
    }

    /// Expressions for every wire of a bundle.
    fn wires(&mut self, bundle: Bundle) -> Vec<Expr> {
        (0..bundle.len).map(|i| self.wire(bundle, i)).collect()
    }

    /// Simulated value of an operand.
    fn evaluate(&mut self, a: impl Into<Operand>) -> Result<FieldElement, EvalError> {
        match a.into() {
            Operand::Const(c) => Ok(c),
            Operand::Expr(e) => {
                let p = self.parts();
                Evaluator::new(p.dag, p.callee).value(e)
            }
        }
    }
}

impl<T: sealed::Sealed> Builder for T {}

fn check_expr(dag: &Dag, bf: Backend, e: Expr) {
    let field = dag.field_of(e);
    assert_eq!(
        field, bf.field,
        "expression {e} of field {field} used with a backend of field {}",
        bf.field
    );
}

/// Push an arithmetic node after checking operand fields against `bf`.
fn node<B: Builder + ?Sized>(b: &mut B, bf: Backend, kind: NodeKind, children: Vec<Expr>) -> Expr {
    let p = b.parts();
    let field = p.scope.slot_mut(bf).field_id;
    for &child in &children {
        check_expr(p.dag, bf, child);
    }
    if let NodeKind::AddConst(c) | NodeKind::MulConst(c) | NodeKind::Public(c) = &kind {
        assert!(
            c.field() == p.fields.get(field),
            "constant {c} belongs to a different field than backend field {field}"
        );
    }
    p.dag.push(p.scope.tag, Some(field), kind, children)
}
