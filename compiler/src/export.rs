//! SIEVE IR 2.0 text export: relation, private input and public input.
//!
//! The relation holds one `@type field` declaration per field (in first-use
//! order), every function definition, the top-level wire space and the
//! top-level gates. Input files are per field and list the recorded values
//! of the top-level `@private` / `@public` gates in emission order.

use std::path::Path;

use ir::{render_gates, wire_range, FieldId, Gate};
use memory::{Field, WireRange};

use crate::circuit::{Circuit, CompiledCircuit};
use crate::error::CircuitError;
use crate::function::{Function, FunctionBody};

// ============================================================================
// Relation
// ============================================================================

/// Header of a function definition: `@function(name, @out: 0:1, @in: 0:3,0:1)`.
fn function_header(f: &Function) -> String {
    let ports = |ports: &[(FieldId, u64)]| {
        ports
            .iter()
            .map(|(field, n)| format!("{field}:{n}"))
            .collect::<Vec<_>>()
            .join(",")
    };
    let mut header = format!("@function({}", f.name());
    if !f.outputs().is_empty() {
        header.push_str(&format!(", @out: {}", ports(f.outputs())));
    }
    if !f.inputs().is_empty() {
        header.push_str(&format!(", @in: {}", ports(f.inputs())));
    }
    header.push(')');
    header
}

/// Lines of one function definition, unindented.
fn function_lines(f: &Function, functions: &[Function]) -> Vec<String> {
    let mut lines = vec![function_header(f)];
    match f.body() {
        FunctionBody::Plugin { name, args } => {
            // plugin functions have no body and no @end
            lines.push("  @plugin(".to_string());
            lines.push(format!("    {name},"));
            for (i, arg) in args.iter().enumerate() {
                let sep = if i + 1 == args.len() { "" } else { "," };
                lines.push(format!("    {}{sep}", arg.render(functions)));
            }
            lines.push("  );".to_string());
        }
        FunctionBody::Gates { gates, .. } => {
            lines.extend(render_gates(gates).map(|g| format!("  {g}")));
            lines.push("@end".to_string());
        }
    }
    lines
}

/// Join lines into file contents, one trailing newline each.
fn to_text(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Render the relation, compiling the circuit first if needed.
pub fn write_relation(circuit: &mut Circuit) -> Result<String, CircuitError> {
    circuit.compile()?;
    let circuit = &*circuit;
    let config = circuit.config();
    let gates = circuit.compiled().map_or(&[][..], CompiledCircuit::gates);
    let wires = circuit.compiled().map_or(WireRange::new(0, 0), CompiledCircuit::wires);

    let mut lines = vec![format!("version {};", config.version), "circuit;".to_string()];
    if !config.header_comment.is_empty() {
        lines.push(String::new());
        lines.push(format!("// {}", config.header_comment));
        lines.push(String::new());
    }
    lines.extend(circuit.fields().iter().map(|(_, field)| format!("@type field {};", field.modulus())));

    lines.push("@begin".to_string());
    let functions = circuit.functions();
    for f in functions {
        lines.extend(function_lines(f, functions).into_iter().map(|line| format!("  {line}")));
    }
    if !wires.is_empty() {
        lines.extend(
            circuit
                .fields()
                .iter()
                .map(|(id, _)| format!("  @new({id}: {});", wire_range(&wires))),
        );
    }
    lines.extend(render_gates(gates).map(|line| format!("  {line}")));
    lines.push("@end".to_string());
    Ok(to_text(lines))
}

// ============================================================================
// Inputs
// ============================================================================

#[derive(Clone, Copy)]
enum InputKind {
    Private,
    Public,
}

fn write_inputs(circuit: &mut Circuit, field: &Field, kind: InputKind) -> Result<String, CircuitError> {
    let version = circuit.config().version.clone();
    let id = circuit.field_id(field);
    let gates = circuit.compile()?.gates();

    let header = match kind {
        InputKind::Private => "private_input;",
        InputKind::Public => "public_input;",
    };
    let mut lines = vec![
        format!("version {version};"),
        header.to_string(),
        format!("@type field {};", field.modulus()),
        "@begin".to_string(),
    ];
    for gate in gates {
        let value = match (kind, gate) {
            (InputKind::Private, Gate::Witness { field, value, .. }) if Some(*field) == id => value,
            (InputKind::Public, Gate::Public { field, value, .. }) if Some(*field) == id => value,
            _ => continue,
        };
        lines.push(format!("  <{value}>;"));
    }
    lines.push("@end".to_string());
    Ok(to_text(lines))
}

/// Private input (witness) file for `field`.
pub fn write_private_input(circuit: &mut Circuit, field: &Field) -> Result<String, CircuitError> {
    write_inputs(circuit, field, InputKind::Private)
}

/// Public input (instance) file for `field`.
pub fn write_public_input(circuit: &mut Circuit, field: &Field) -> Result<String, CircuitError> {
    write_inputs(circuit, field, InputKind::Public)
}

/// Write `relation.txt` plus `private.txt` / `public.txt` into `dir`. With
/// several fields the input files are suffixed by field index
/// (`private.1.txt`, ...); field 0 keeps the plain name.
pub fn write_dir(circuit: &mut Circuit, dir: impl AsRef<Path>) -> Result<(), CircuitError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join("relation.txt"), write_relation(circuit)?)?;

    let fields: Vec<(FieldId, Field)> = circuit.fields().iter().map(|(id, f)| (id, f.clone())).collect();
    for (id, field) in fields {
        let suffix = if id.0 == 0 { String::new() } else { format!(".{id}") };
        std::fs::write(
            dir.join(format!("private{suffix}.txt")),
            write_private_input(circuit, &field)?,
        )?;
        std::fs::write(
            dir.join(format!("public{suffix}.txt")),
            write_public_input(circuit, &field)?,
        )?;
    }
    Ok(())
}
