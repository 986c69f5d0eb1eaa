pub mod error;
pub mod eval;
pub mod types;

pub use error::EvalError;
pub use eval::{run_gates, GateEnv, WireStore};
pub use types::{render_gates, wire_range, FieldId, FuncRef, Gate};
