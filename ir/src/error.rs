use memory::FieldElement;
use thiserror::Error;

use crate::types::FieldId;

/// Failures while simulating a gate stream or evaluating an expression.
///
/// These are data-dependent (a witness that does not satisfy the circuit, a
/// selector with no matching clause). Structural misuse of the builder is an
/// invariant violation and panics instead.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// A gate read a wire that no earlier gate (or argument) assigned.
    #[error("read of undefined wire ${0}")]
    UndefinedWire(u64),

    #[error("assert_zero failed on wire ${wire} of field {field} (value is {value})")]
    AssertZeroFailed {
        field: FieldId,
        wire: u64,
        value: FieldElement,
    },

    /// Witness and public gates load values recorded at compile time; a
    /// function body is replayed once per call and has no value to load.
    #[error("cannot replay input gate for wire ${wire} inside function `{function}`")]
    InputInFunction { function: String, wire: u64 },

    #[error("plugin `{plugin}` has no clause for selector {selector}")]
    NoMatchingClause {
        plugin: String,
        selector: FieldElement,
    },

    /// Raised by user witness closures.
    #[error("witness generation failed: {0}")]
    Witness(String),
}
