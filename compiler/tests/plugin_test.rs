//! Disjunction plugin: declaration checks, emission and branch selection.

use compiler::export::write_relation;
use compiler::{Builder, CallArg, Circuit, CircuitError, Disjunction, FuncId, PluginArg};
use ir::EvalError;
use memory::Field;

const P61: u64 = 2305843009213693951;

fn field() -> Field {
    Field::new(P61)
}

/// Clause `fail`: asserts its input is zero and returns it.
/// Clause `inc`: returns its input plus one.
fn declare_clauses(c: &mut Circuit, f: &Field) -> (FuncId, FuncId) {
    let fail = c
        .function("fail", |fb| {
            let bf = fb.backend(f);
            let input = fb.input(bf, 1);
            let out = fb.output(bf, 1);
            let x = fb.wire(input, 0);
            fb.assert_zero(bf, x);
            fb.assign(out, 0, x);
        })
        .unwrap();
    let inc = c
        .function("inc", |fb| {
            let bf = fb.backend(f);
            let input = fb.input(bf, 1);
            let out = fb.output(bf, 1);
            let x = fb.wire(input, 0);
            let y = fb.add(bf, x, f.one()).expr().unwrap();
            fb.assign(out, 0, y);
        })
        .unwrap();
    (fail, inc)
}

fn declare_switch(c: &mut Circuit, f: &Field, args: Vec<PluginArg>) -> FuncId {
    c.function("switch", |fb| {
        let bf = fb.backend(f);
        fb.input(bf, 1);
        fb.input(bf, 1);
        fb.output(bf, 1);
        fb.plugin(Disjunction::NAME, args);
    })
    .unwrap()
}

/// `switch(cond, x)` with clause 0 = `fail`, clause 1 = `inc`.
fn disjunction_circuit(selector: u64, input: u64) -> (Circuit, compiler::Expr) {
    let f = field();
    let mut c = Circuit::new();
    let (fail, inc) = declare_clauses(&mut c, &f);
    let switch = declare_switch(&mut c, &f, Disjunction::args(&[(0, fail), (1, inc)]));

    let bf = c.backend(&f);
    let (fc, fx) = (f.clone(), f.clone());
    let cond = c.private(bf, move |_| Ok(fc.from_u64(selector)));
    let x = c.private(bf, move |_| Ok(fx.from_u64(input)));
    let outs = c.call(switch, vec![CallArg::Single(cond), CallArg::Single(x)]);
    let result = c.wire(outs[0], 0);
    c.live(bf, result);
    (c, result)
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn test_only_selected_clause_is_evaluated() {
    let (mut c, result) = disjunction_circuit(1, 5);
    // clause 0 would fail its assertion on x = 5
    assert_eq!(c.evaluate(result).unwrap(), field().from_u64(6));
    c.simulate().unwrap();
}

#[test]
fn test_selected_failing_clause_reports_assertion() {
    let (mut c, result) = disjunction_circuit(0, 5);
    let err = c.evaluate(result).unwrap_err();
    assert!(matches!(err, EvalError::AssertZeroFailed { .. }));
    assert!(matches!(
        c.simulate().unwrap_err(),
        CircuitError::Eval(EvalError::AssertZeroFailed { .. })
    ));
}

#[test]
fn test_unmatched_selector_is_an_error() {
    let (mut c, result) = disjunction_circuit(7, 5);
    match c.evaluate(result).unwrap_err() {
        EvalError::NoMatchingClause { plugin, selector } => {
            assert_eq!(plugin, Disjunction::NAME);
            assert_eq!(selector, field().from_u64(7));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_plugin_function_emission() {
    let (mut c, _) = disjunction_circuit(1, 5);
    let rel = write_relation(&mut c).unwrap();
    let expected = "  @function(switch, @out: 0:1, @in: 0:1,0:1)\n    @plugin(\n      galois_disjunction_v0,\n      switch,\n      strict,\n      0,\n      fail,\n      1,\n      inc\n    );\n";
    assert!(rel.contains(expected), "relation was:\n{rel}");
    // the plugin block is not closed by @end; only the two clause bodies and the relation are
    assert_eq!(rel.matches("@end").count(), 3);
    assert!(rel.contains("@call(switch, $0, $1);"));
}

// ============================================================================
// Declaration checks
// ============================================================================

#[test]
#[should_panic(expected = "must start with `switch, strict`")]
fn test_missing_mode_tokens_panics() {
    let f = field();
    let mut c = Circuit::new();
    let (fail, _) = declare_clauses(&mut c, &f);
    declare_switch(&mut c, &f, vec![PluginArg::literal("0"), PluginArg::Function(fail)]);
}

#[test]
#[should_panic(expected = "expected `<selector>, <function>` pairs")]
fn test_unpaired_clause_panics() {
    let f = field();
    let mut c = Circuit::new();
    let (fail, inc) = declare_clauses(&mut c, &f);
    let mut args = Disjunction::args(&[(0, fail)]);
    args.push(PluginArg::Function(inc));
    args.push(PluginArg::literal("1"));
    declare_switch(&mut c, &f, args);
}

#[test]
#[should_panic(expected = "inputs of clause `wide` do not match")]
fn test_clause_signature_mismatch_panics() {
    let f = field();
    let mut c = Circuit::new();
    let wide = c
        .function("wide", |fb| {
            let bf = fb.backend(&f);
            let input = fb.input(bf, 2);
            let out = fb.output(bf, 1);
            let x = fb.wire(input, 0);
            fb.assign(out, 0, x);
        })
        .unwrap();
    declare_switch(&mut c, &f, Disjunction::args(&[(0, wide)]));
}

#[test]
#[should_panic(expected = "duplicate selector")]
fn test_duplicate_selector_panics() {
    let f = field();
    let mut c = Circuit::new();
    let (fail, inc) = declare_clauses(&mut c, &f);
    declare_switch(&mut c, &f, Disjunction::args(&[(1, fail), (1, inc)]));
}

#[test]
#[should_panic(expected = "unknown plugin `galois_permutation_v0`")]
fn test_unknown_plugin_panics() {
    let f = field();
    let mut c = Circuit::new();
    let _ = c.function("perm", |fb| {
        let bf = fb.backend(&f);
        fb.input(bf, 1);
        fb.output(bf, 1);
        fb.plugin("galois_permutation_v0", Vec::new());
    });
}

#[test]
#[should_panic(expected = "cannot define roots")]
fn test_plugin_function_with_body_panics() {
    let f = field();
    let mut c = Circuit::new();
    let (fail, inc) = declare_clauses(&mut c, &f);
    let _ = c.function("switch", |fb| {
        let bf = fb.backend(&f);
        let cond = fb.input(bf, 1);
        fb.input(bf, 1);
        fb.output(bf, 1);
        let w = fb.wire(cond, 0);
        fb.assert_zero(bf, w);
        fb.plugin(Disjunction::NAME, Disjunction::args(&[(0, fail), (1, inc)]));
    });
}
