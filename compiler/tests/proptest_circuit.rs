//! Property-based tests for the expression compiler.
//!
//! Random expression DAGs with shared subterms are built over random
//! witnesses, asserted against their own evaluated values and compiled.
//! The gate stream must then replay cleanly and the top-level allocator
//! must end up with every wire released.

use compiler::{Builder, CallArg, Circuit, Operand};
use memory::namespace::UNBOUNDED;
use memory::{Field, WireRange};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const P61: u64 = 2305843009213693951;

// ============================================================================
// Helpers
// ============================================================================

/// One construction step; operand indices wrap around the current pool.
#[derive(Debug, Clone)]
enum Step {
    Witness,
    Add(usize, usize),
    Mul(usize, usize),
    Sub(usize, usize),
    AddConst(usize, u64),
    MulConst(usize, u64),
    Assert(usize),
    Live(usize),
}

fn step() -> impl Strategy<Value = Step> {
    let idx = 0..64usize;
    prop_oneof![
        2 => Just(Step::Witness),
        3 => (idx.clone(), idx.clone()).prop_map(|(a, b)| Step::Add(a, b)),
        3 => (idx.clone(), idx.clone()).prop_map(|(a, b)| Step::Mul(a, b)),
        1 => (idx.clone(), idx.clone()).prop_map(|(a, b)| Step::Sub(a, b)),
        1 => (idx.clone(), any::<u64>()).prop_map(|(a, c)| Step::AddConst(a, c)),
        1 => (idx.clone(), any::<u64>()).prop_map(|(a, c)| Step::MulConst(a, c)),
        2 => idx.clone().prop_map(Step::Assert),
        1 => idx.prop_map(Step::Live),
    ]
}

/// Build the circuit described by `steps`. Every asserted operand is
/// compared against its own evaluated value, so the circuit is satisfiable.
fn build(f: &Field, seed: u64, steps: &[Step], with_function: bool) -> Circuit {
    let mut c = Circuit::new();
    let square = with_function.then(|| {
        c.function("square", |fb| {
            let bf = fb.backend(f);
            let input = fb.input(bf, 1);
            let out = fb.output(bf, 1);
            let x = fb.wire(input, 0);
            let y = fb.mul(bf, x, x).expr().unwrap();
            fb.assign(out, 0, y);
        })
        .unwrap()
    });

    let bf = c.backend(f);
    let mut rng = StdRng::seed_from_u64(seed);
    let first = f.random(&mut rng);
    let mut pool: Vec<Operand> = vec![c.private(bf, move |_| Ok(first)).into()];

    for s in steps {
        let pick = |i: &usize| pool[i % pool.len()].clone();
        let next = match s {
            Step::Witness => {
                let v = f.random(&mut rng);
                c.private(bf, move |_| Ok(v)).into()
            }
            Step::Add(a, b) => c.add(bf, pick(a), pick(b)),
            Step::Mul(a, b) => c.mul(bf, pick(a), pick(b)),
            Step::Sub(a, b) => c.sub(bf, pick(a), pick(b)),
            Step::AddConst(a, k) => c.add(bf, pick(a), f.from_u64(*k)),
            Step::MulConst(a, k) => c.mul(bf, pick(a), f.from_u64(*k)),
            Step::Assert(a) => {
                let x = pick(a);
                let v = c.evaluate(x.clone()).unwrap();
                c.assert_eq(bf, x, v);
                continue;
            }
            Step::Live(a) => {
                let x = pick(a);
                c.live(bf, x);
                continue;
            }
        };
        pool.push(next);
    }

    if let Some(square) = square {
        let last = pool[pool.len() - 1].clone();
        if let Operand::Expr(e) = last {
            let v = c.evaluate(e).unwrap();
            let outs = c.call(square, vec![CallArg::Single(e)]);
            let y = c.wire(outs[0], 0);
            c.assert_eq(bf, y, v.mul(&v));
        }
    }
    c
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_compiled_dag_replays(seed in any::<u64>(), steps in prop::collection::vec(step(), 1..48)) {
        let f = Field::new(P61);
        let mut c = build(&f, seed, &steps, false);
        prop_assert!(c.simulate().is_ok());
    }

    #[test]
    fn prop_allocator_is_fully_released(seed in any::<u64>(), steps in prop::collection::vec(step(), 1..48)) {
        let f = Field::new(P61);
        let mut c = build(&f, seed, &steps, false);
        let compiled = c.compile().unwrap();
        let ns = compiled.namespace();
        prop_assert_eq!(ns.allocated_count(), 0);
        prop_assert_eq!(ns.free_ranges(), vec![WireRange::new(0, UNBOUNDED)]);
        ns.check_invariants();
    }

    #[test]
    fn prop_calls_replay(seed in any::<u64>(), steps in prop::collection::vec(step(), 1..32)) {
        let f = Field::new(P61);
        let mut c = build(&f, seed, &steps, true);
        prop_assert!(c.simulate().is_ok());
    }

    #[test]
    fn prop_wrong_assertion_fails(a in any::<u64>(), delta in 1u64..1000) {
        let f = Field::new(P61);
        let mut c = Circuit::new();
        let bf = c.backend(&f);
        let fa = f.clone();
        let x = c.private(bf, move |_| Ok(fa.from_u64(a)));
        let sq = c.mul(bf, x, x);
        let wrong = c.evaluate(sq.clone()).unwrap().add(&f.from_u64(delta));
        c.assert_eq(bf, sq, wrong);
        prop_assert!(c.simulate().is_err());
    }
}
