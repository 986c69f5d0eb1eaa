use ir::EvalError;
use thiserror::Error;

/// Errors surfaced by [`Circuit`](crate::circuit::Circuit) operations.
///
/// Misuse of the builder API (double assignment, arity mismatch, unknown
/// plugin, ...) is not represented here: it panics at the offending call.
#[derive(Debug, Error)]
pub enum CircuitError {
    /// Witness generation or simulation failed.
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// An earlier `compile` or `function` call failed; the circuit can no
    /// longer be compiled.
    #[error("circuit is unusable after a failed compilation: {0}")]
    Failed(EvalError),

    #[error("invalid circuit configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
