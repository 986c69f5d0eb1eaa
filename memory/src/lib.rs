pub mod field;
pub mod namespace;

pub use field::{Field, FieldElement};
pub use namespace::{WireAllocator, WireRange};
