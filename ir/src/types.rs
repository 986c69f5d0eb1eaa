use std::fmt;

use memory::{FieldElement, WireRange};

/// Index of a field in the circuit's `@type field` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub u32);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a declared function: its position in the circuit's function
/// table plus the name it is emitted under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncRef {
    pub index: usize,
    pub name: String,
}

impl fmt::Display for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A single primitive gate over wire labels.
///
/// Gates are append-only: once emitted into a gate stream they are never
/// mutated. Witness and public gates carry the value they load so the input
/// files can be produced (and the stream simulated) without re-running the
/// builder.
#[derive(Debug, Clone)]
pub enum Gate {
    /// out = lhs + rhs
    Add {
        field: FieldId,
        out: u64,
        lhs: u64,
        rhs: u64,
    },
    /// out = lhs * rhs
    Mul {
        field: FieldId,
        out: u64,
        lhs: u64,
        rhs: u64,
    },
    /// out = input + constant
    AddConst {
        field: FieldId,
        out: u64,
        input: u64,
        constant: FieldElement,
    },
    /// out = input * constant
    MulConst {
        field: FieldId,
        out: u64,
        input: u64,
        constant: FieldElement,
    },
    /// out <- next private input
    Witness {
        field: FieldId,
        out: u64,
        value: FieldElement,
    },
    /// out <- next public input
    Public {
        field: FieldId,
        out: u64,
        value: FieldElement,
    },
    /// dst[i] <- srcs[i]
    Copy {
        field: FieldId,
        dst: WireRange,
        srcs: Vec<u64>,
    },
    /// Constraint: wire == 0.
    AssertZero { field: FieldId, wire: u64 },
    /// outputs <- func(args)
    Call {
        func: FuncRef,
        outputs: Vec<WireRange>,
        args: Vec<WireRange>,
    },
}

impl Gate {
    /// The wires written by this gate.
    pub fn outputs(&self) -> Vec<u64> {
        match self {
            Gate::Add { out, .. }
            | Gate::Mul { out, .. }
            | Gate::AddConst { out, .. }
            | Gate::MulConst { out, .. }
            | Gate::Witness { out, .. }
            | Gate::Public { out, .. } => vec![*out],
            Gate::Copy { dst, .. } => dst.iter().collect(),
            Gate::AssertZero { .. } => vec![],
            Gate::Call { outputs, .. } => outputs.iter().flat_map(|r| r.iter()).collect(),
        }
    }

    /// The wires read by this gate.
    pub fn inputs(&self) -> Vec<u64> {
        match self {
            Gate::Add { lhs, rhs, .. } | Gate::Mul { lhs, rhs, .. } => vec![*lhs, *rhs],
            Gate::AddConst { input, .. } | Gate::MulConst { input, .. } => vec![*input],
            Gate::Witness { .. } | Gate::Public { .. } => vec![],
            Gate::Copy { srcs, .. } => srcs.clone(),
            Gate::AssertZero { wire, .. } => vec![*wire],
            Gate::Call { args, .. } => args.iter().flat_map(|r| r.iter()).collect(),
        }
    }

    /// Render as SIEVE IR 2.0 instructions, one per line.
    ///
    /// ```
    /// use ir::{FieldId, Gate};
    ///
    /// let g = Gate::Mul { field: FieldId(0), out: 2, lhs: 0, rhs: 1 };
    /// assert_eq!(g.render(), vec!["$2 <- @mul($0, $1);"]);
    /// ```
    pub fn render(&self) -> Vec<String> {
        match self {
            Gate::Add { out, lhs, rhs, .. } => vec![format!("${out} <- @add(${lhs}, ${rhs});")],
            Gate::Mul { out, lhs, rhs, .. } => vec![format!("${out} <- @mul(${lhs}, ${rhs});")],
            Gate::AddConst {
                out,
                input,
                constant,
                ..
            } => vec![format!("${out} <- @addc(${input}, <{constant}>);")],
            Gate::MulConst {
                out,
                input,
                constant,
                ..
            } => vec![format!("${out} <- @mulc(${input}, <{constant}>);")],
            Gate::Witness { field, out, .. } => vec![format!("${out} <- @private({field});")],
            Gate::Public { field, out, .. } => vec![format!("${out} <- @public({field});")],
            // the consuming parser does not accept range copies, so expand per wire
            Gate::Copy { dst, srcs, .. } => dst
                .iter()
                .zip(srcs)
                .map(|(d, s)| format!("${d} <- ${s};"))
                .collect(),
            Gate::AssertZero { field, wire } => vec![format!("@assert_zero({field}: ${wire});")],
            Gate::Call {
                func,
                outputs,
                args,
            } => {
                let outs: Vec<String> = outputs.iter().map(wire_range).collect();
                let ins: Vec<String> = args.iter().map(wire_range).collect();
                let call = if ins.is_empty() {
                    format!("@call({func})")
                } else {
                    format!("@call({func}, {})", ins.join(", "))
                };
                if outs.is_empty() {
                    vec![format!("{call};")]
                } else {
                    vec![format!("{} <- {call};", outs.join(", "))]
                }
            }
        }
    }
}

/// `$a` for a single wire, `$a ... $b` (inclusive) otherwise.
pub fn wire_range(range: &WireRange) -> String {
    if range.len() == 1 {
        format!("${}", range.start)
    } else {
        format!("${} ... ${}", range.start, range.end - 1)
    }
}

/// Render a gate stream, flattening multi-line gates.
pub fn render_gates(gates: &[Gate]) -> impl Iterator<Item = String> + '_ {
    gates.iter().flat_map(Gate::render)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory::Field;

    #[test]
    fn test_constant_gates_render_residue() {
        let f = Field::new(97u32);
        let g = Gate::AddConst {
            field: FieldId(0),
            out: 4,
            input: 3,
            constant: f.from_i64(-1),
        };
        assert_eq!(g.render(), vec!["$4 <- @addc($3, <96>);"]);
    }

    #[test]
    fn test_copy_expands_per_wire() {
        let g = Gate::Copy {
            field: FieldId(0),
            dst: WireRange::new(10, 13),
            srcs: vec![9, 7, 8],
        };
        assert_eq!(g.render(), vec!["$10 <- $9;", "$11 <- $7;", "$12 <- $8;"]);
        assert_eq!(g.outputs(), vec![10, 11, 12]);
        assert_eq!(g.inputs(), vec![9, 7, 8]);
    }

    #[test]
    fn test_call_renders_ranges() {
        let g = Gate::Call {
            func: FuncRef {
                index: 0,
                name: "f0".into(),
            },
            outputs: vec![WireRange::new(10, 12), WireRange::single(12)],
            args: vec![WireRange::single(3), WireRange::new(7, 10)],
        };
        assert_eq!(g.render(), vec!["$10 ... $11, $12 <- @call(f0, $3, $7 ... $9);"]);
    }
}
