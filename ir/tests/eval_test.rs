use ir::{run_gates, EvalError, FieldId, FuncRef, Gate, GateEnv, WireStore};
use memory::{Field, FieldElement, WireRange};

const F0: FieldId = FieldId(0);

fn field() -> Field {
    Field::new(2305843009213693951u64)
}

/// Env whose only function doubles every argument wire and sums them.
struct DoubleEnv {
    calls: usize,
}

impl GateEnv for DoubleEnv {
    fn call(
        &mut self,
        _func: &FuncRef,
        args: Vec<Vec<FieldElement>>,
    ) -> Result<Vec<Vec<FieldElement>>, EvalError> {
        self.calls += 1;
        let doubled = args
            .iter()
            .flatten()
            .map(|v| v.add(v))
            .collect::<Vec<_>>();
        Ok(vec![doubled])
    }
}

#[test]
fn test_arithmetic_gates() {
    let f = field();
    let gates = vec![
        Gate::Witness { field: F0, out: 0, value: f.from_u64(6) },
        Gate::Witness { field: F0, out: 1, value: f.from_u64(7) },
        Gate::Mul { field: F0, out: 2, lhs: 0, rhs: 1 },
        Gate::AddConst { field: F0, out: 3, input: 2, constant: f.from_i64(-42) },
        Gate::AssertZero { field: F0, wire: 3 },
        Gate::MulConst { field: F0, out: 4, input: 0, constant: f.from_u64(3) },
        Gate::Add { field: F0, out: 5, lhs: 4, rhs: 1 },
    ];
    let mut store = WireStore::new();
    let mut env = DoubleEnv { calls: 0 };
    run_gates(&gates, &mut store, &mut env).unwrap();

    assert!(store.get(3).unwrap().is_zero());
    assert_eq!(*store.get(5).unwrap(), f.from_u64(25));
}

#[test]
fn test_assert_zero_failure_reports_wire() {
    let f = field();
    let gates = vec![
        Gate::Witness { field: F0, out: 0, value: f.from_u64(1) },
        Gate::AssertZero { field: F0, wire: 0 },
    ];
    let mut store = WireStore::new();
    let err = run_gates(&gates, &mut store, &mut DoubleEnv { calls: 0 }).unwrap_err();
    match err {
        EvalError::AssertZeroFailed { wire, value, .. } => {
            assert_eq!(wire, 0);
            assert!(value.is_one());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_undefined_wire() {
    let gates = vec![Gate::Add { field: F0, out: 2, lhs: 0, rhs: 1 }];
    let err = run_gates(&gates, &mut WireStore::new(), &mut DoubleEnv { calls: 0 }).unwrap_err();
    assert!(matches!(err, EvalError::UndefinedWire(0)));
}

#[test]
fn test_copy_and_call() {
    let f = field();
    let gates = vec![
        Gate::Witness { field: F0, out: 9, value: f.from_u64(1) },
        Gate::Witness { field: F0, out: 7, value: f.from_u64(2) },
        Gate::Witness { field: F0, out: 8, value: f.from_u64(3) },
        Gate::Copy { field: F0, dst: WireRange::new(10, 13), srcs: vec![9, 7, 8] },
        Gate::Call {
            func: FuncRef { index: 0, name: "double".into() },
            outputs: vec![WireRange::new(13, 16)],
            args: vec![WireRange::new(10, 13)],
        },
    ];
    let mut store = WireStore::new();
    let mut env = DoubleEnv { calls: 0 };
    run_gates(&gates, &mut store, &mut env).unwrap();

    assert_eq!(env.calls, 1);
    let out: Vec<u64> = (13..16).map(|w| store.get(w).unwrap().to_u64().unwrap()).collect();
    assert_eq!(out, vec![2, 4, 6]);
}
