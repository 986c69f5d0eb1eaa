//! Plugins: functions whose semantics live outside the gate stream.
//!
//! The registry is closed: it knows the plugins shipped with the compiler
//! and naming any other plugin is a construction error.

use std::collections::BTreeMap;
use std::fmt;

use ir::EvalError;
use memory::FieldElement;
use num_bigint::BigUint;

use crate::function::{Callee, FuncId, Function};

/// One argument of a `@plugin(...)` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginArg {
    /// Bare token, emitted verbatim.
    Literal(String),
    /// Reference to a declared function, emitted by name.
    Function(FuncId),
}

impl PluginArg {
    pub fn literal(s: impl Into<String>) -> Self {
        PluginArg::Literal(s.into())
    }

    pub fn render(&self, functions: &[Function]) -> String {
        match self {
            PluginArg::Literal(s) => s.clone(),
            PluginArg::Function(f) => functions[f.0].name().to_string(),
        }
    }
}

pub(crate) trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check a declaration against the plugin's argument grammar. Panics on
    /// malformed arguments.
    fn validate(&self, decl: &Function, args: &[PluginArg], functions: &[Function]);

    fn evaluate(
        &self,
        args: &[PluginArg],
        inputs: Vec<Vec<FieldElement>>,
        callee: Callee<'_>,
    ) -> Result<Vec<Vec<FieldElement>>, EvalError>;
}

// ============================================================================
// Registry
// ============================================================================

pub struct PluginRegistry {
    plugins: BTreeMap<&'static str, Box<dyn Plugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.plugins.keys()).finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        let mut plugins: BTreeMap<&'static str, Box<dyn Plugin>> = BTreeMap::new();
        let disjunction = Disjunction;
        plugins.insert(disjunction.name(), Box::new(disjunction));
        Self { plugins }
    }
}

impl PluginRegistry {
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.plugins.keys().copied()
    }

    pub(crate) fn get(&self, name: &str) -> &dyn Plugin {
        match self.plugins.get(name) {
            Some(p) => p.as_ref(),
            None => panic!("unknown plugin `{name}`"),
        }
    }
}

// ============================================================================
// Disjunction
// ============================================================================

/// `galois_disjunction_v0`: select one clause function by the value of a
/// leading 1-wire condition input.
///
/// Arguments: `switch, strict, <selector>, <clause>, <selector>, <clause>...`.
/// Each clause takes the disjunction's inputs minus the condition and has
/// the same outputs.
#[derive(Debug, Clone, Copy)]
pub struct Disjunction;

impl Disjunction {
    pub const NAME: &'static str = "galois_disjunction_v0";

    /// Plugin arguments for a clause list.
    pub fn args(clauses: &[(u64, FuncId)]) -> Vec<PluginArg> {
        let mut args = vec![PluginArg::literal("switch"), PluginArg::literal("strict")];
        for (selector, clause) in clauses {
            args.push(PluginArg::Literal(selector.to_string()));
            args.push(PluginArg::Function(*clause));
        }
        args
    }

    /// `(selector, clause)` pairs following the mode tokens.
    fn clauses(args: &[PluginArg]) -> Vec<(BigUint, FuncId)> {
        args[2..]
            .chunks(2)
            .map(|pair| match pair {
                [PluginArg::Literal(s), PluginArg::Function(f)] => match s.parse::<BigUint>() {
                    Ok(selector) => (selector, *f),
                    Err(_) => panic!("{}: selector `{s}` is not a non-negative integer", Self::NAME),
                },
                _ => panic!("{}: expected `<selector>, <function>` pairs", Self::NAME),
            })
            .collect()
    }
}

impl Plugin for Disjunction {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self, decl: &Function, args: &[PluginArg], functions: &[Function]) {
        let mode_ok = matches!(
            args,
            [PluginArg::Literal(sw), PluginArg::Literal(st), ..] if sw == "switch" && st == "strict"
        );
        assert!(mode_ok, "{}: arguments must start with `switch, strict`", Self::NAME);
        assert!(
            args.len() > 2 && args.len() % 2 == 0,
            "{}: expected at least one `<selector>, <function>` pair",
            Self::NAME
        );

        let Some(((_, cond_width), rest)) = decl.inputs().split_first() else {
            panic!("{}: `{}` has no condition input", Self::NAME, decl.name());
        };
        assert_eq!(*cond_width, 1, "{}: condition input of `{}` must be one wire", Self::NAME, decl.name());

        let clauses = Self::clauses(args);
        for (i, (selector, clause)) in clauses.iter().enumerate() {
            assert!(
                clauses[..i].iter().all(|(s, _)| s != selector),
                "{}: duplicate selector {selector}",
                Self::NAME
            );
            let Some(f) = functions.get(clause.0) else {
                panic!("{}: clause #{} is not declared", Self::NAME, clause.0);
            };
            assert_eq!(
                f.inputs(),
                rest,
                "{}: inputs of clause `{}` do not match `{}`",
                Self::NAME,
                f.name(),
                decl.name()
            );
            assert_eq!(
                f.outputs(),
                decl.outputs(),
                "{}: outputs of clause `{}` do not match `{}`",
                Self::NAME,
                f.name(),
                decl.name()
            );
        }
    }

    fn evaluate(
        &self,
        args: &[PluginArg],
        mut inputs: Vec<Vec<FieldElement>>,
        callee: Callee<'_>,
    ) -> Result<Vec<Vec<FieldElement>>, EvalError> {
        let condition = inputs.remove(0);
        let Some(selector) = condition.into_iter().next() else {
            panic!("{}: empty condition input", Self::NAME);
        };

        for (value, clause) in Self::clauses(args) {
            if *selector.value() == value {
                return callee.call(clause.0, inputs);
            }
        }
        Err(EvalError::NoMatchingClause {
            plugin: Self::NAME.to_string(),
            selector,
        })
    }
}
