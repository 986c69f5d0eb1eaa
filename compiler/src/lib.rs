//! Circus: a compiler from arithmetic expressions to SIEVE IR 2.0 circuits.
//!
//! Expressions are built through the [`Builder`] trait on a [`Circuit`] (or
//! on a [`FunctionBuilder`] inside a function definition), stored in a
//! reference-counted DAG, and lowered scope by scope into gate streams with
//! reused wire labels.
//!
//! ```
//! use compiler::{Builder, Circuit};
//! use memory::Field;
//!
//! let field = Field::new(2305843009213693951u64);
//! let mut c = Circuit::new();
//! let bf = c.backend(&field);
//!
//! let f = field.clone();
//! let x = c.private(bf, move |_| Ok(f.from_u64(3)));
//! let sq = c.mul(bf, x, x);
//! c.assert_eq(bf, sq, field.from_u64(9));
//!
//! c.simulate().unwrap();
//! let rel = compiler::export::write_relation(&mut c).unwrap();
//! assert!(rel.contains("@mul($0, $0)"));
//! ```

pub mod builder;
pub mod circuit;
pub mod config;
pub mod dag;
pub mod error;
pub mod export;
pub mod function;
pub mod plugin;
pub(crate) mod scope;

pub use builder::{Builder, FieldTable, Operand};
pub use circuit::{Circuit, CompiledCircuit};
pub use config::CircuitConfig;
pub use dag::{Bundle, CallArg, Dag, Evaluator, Expr};
pub use error::CircuitError;
pub use function::{FuncId, Function, FunctionBody, FunctionBuilder, Output};
pub use plugin::{Disjunction, PluginArg, PluginRegistry};
pub use scope::Backend;
