use memory::FieldElement;
use rustc_hash::FxHashMap;

use crate::error::EvalError;
use crate::types::{FieldId, FuncRef, Gate};

// ============================================================================
// WireStore
// ============================================================================

/// Concrete wire assignment used when replaying a gate stream.
#[derive(Debug, Clone, Default)]
pub struct WireStore {
    values: FxHashMap<u64, FieldElement>,
}

impl WireStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, wire: u64) -> Result<&FieldElement, EvalError> {
        self.values.get(&wire).ok_or(EvalError::UndefinedWire(wire))
    }

    pub fn set(&mut self, wire: u64, value: FieldElement) {
        self.values.insert(wire, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// GateEnv
// ============================================================================

/// What a gate stream needs from its surroundings while being replayed:
/// values for input-loading gates, and the callee of `@call` gates.
pub trait GateEnv {
    /// Value loaded by a `@private` gate. The default replays the value
    /// recorded at compile time.
    fn witness(&mut self, _field: FieldId, _wire: u64, recorded: &FieldElement) -> Result<FieldElement, EvalError> {
        Ok(recorded.clone())
    }

    /// Value loaded by a `@public` gate.
    fn public(&mut self, _field: FieldId, _wire: u64, recorded: &FieldElement) -> Result<FieldElement, EvalError> {
        Ok(recorded.clone())
    }

    /// Evaluate `func` on one value tuple per argument range, returning one
    /// value tuple per output range.
    fn call(
        &mut self,
        func: &FuncRef,
        args: Vec<Vec<FieldElement>>,
    ) -> Result<Vec<Vec<FieldElement>>, EvalError>;
}

// ============================================================================
// Gate execution
// ============================================================================

impl Gate {
    /// Execute this gate against `store`.
    pub fn run(&self, store: &mut WireStore, env: &mut dyn GateEnv) -> Result<(), EvalError> {
        match self {
            Gate::Add { out, lhs, rhs, .. } => {
                let v = store.get(*lhs)?.add(store.get(*rhs)?);
                store.set(*out, v);
            }
            Gate::Mul { out, lhs, rhs, .. } => {
                let v = store.get(*lhs)?.mul(store.get(*rhs)?);
                store.set(*out, v);
            }
            Gate::AddConst {
                out,
                input,
                constant,
                ..
            } => {
                let v = store.get(*input)?.add(constant);
                store.set(*out, v);
            }
            Gate::MulConst {
                out,
                input,
                constant,
                ..
            } => {
                let v = store.get(*input)?.mul(constant);
                store.set(*out, v);
            }
            Gate::Witness { field, out, value } => {
                let v = env.witness(*field, *out, value)?;
                store.set(*out, v);
            }
            Gate::Public { field, out, value } => {
                let v = env.public(*field, *out, value)?;
                store.set(*out, v);
            }
            Gate::Copy { dst, srcs, .. } => {
                // read everything first: dst may overlap srcs
                let values = srcs
                    .iter()
                    .map(|s| store.get(*s).cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                for (d, v) in dst.iter().zip(values) {
                    store.set(d, v);
                }
            }
            Gate::AssertZero { field, wire } => {
                let v = store.get(*wire)?;
                if !v.is_zero() {
                    return Err(EvalError::AssertZeroFailed {
                        field: *field,
                        wire: *wire,
                        value: v.clone(),
                    });
                }
            }
            Gate::Call {
                func,
                outputs,
                args,
            } => {
                let mut arg_values = Vec::with_capacity(args.len());
                for range in args {
                    let tuple = range
                        .iter()
                        .map(|w| store.get(w).cloned())
                        .collect::<Result<Vec<_>, _>>()?;
                    arg_values.push(tuple);
                }

                let results = env.call(func, arg_values)?;
                assert_eq!(
                    results.len(),
                    outputs.len(),
                    "function `{func}` returned {} output groups, call site expects {}",
                    results.len(),
                    outputs.len()
                );
                for (range, values) in outputs.iter().zip(results) {
                    assert_eq!(
                        range.len(),
                        values.len() as u64,
                        "function `{func}` output width mismatch"
                    );
                    for (w, v) in range.iter().zip(values) {
                        store.set(w, v);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Replay a gate stream in order, stopping at the first failure.
pub fn run_gates(gates: &[Gate], store: &mut WireStore, env: &mut dyn GateEnv) -> Result<(), EvalError> {
    for gate in gates {
        gate.run(store, env)?;
    }
    Ok(())
}
