//! Text export of relations and input files, and emission settings.

use compiler::export::{write_dir, write_private_input, write_public_input, write_relation};
use compiler::{Builder, Circuit, CircuitConfig, CircuitError};
use memory::Field;

const P61: u64 = 2305843009213693951;

fn field() -> Field {
    Field::new(P61)
}

fn non_zero_circuit(config: CircuitConfig) -> Circuit {
    let f = field();
    let mut c = Circuit::with_config(config);
    let bf = c.backend(&f);
    let fx = f.clone();
    let x = c.private(bf, move |_| Ok(fx.from_u64(5)));
    let y = c.private(bf, move |ev| Ok(ev.value(x)?.inv()));
    let xy = c.mul(bf, x, y);
    c.assert_eq(bf, xy, f.one());
    c
}

// ============================================================================
// Relation
// ============================================================================

#[test]
fn test_relation_text() {
    let mut c = non_zero_circuit(CircuitConfig::default());
    let rel = write_relation(&mut c).unwrap();
    let expected = "\
version 2.0.0;
circuit;

// Circuit generated by the \"Circus\" Expression Compiler

@type field 2305843009213693951;
@begin
  @new(0: $0 ... $3);
  $0 <- @private(0);
  $1 <- @private(0);
  $2 <- @mul($0, $1);
  $3 <- @addc($2, <2305843009213693950>);
  @assert_zero(0: $3);
@end
";
    assert_eq!(rel, expected);
}

#[test]
fn test_empty_header_comment_is_omitted() {
    let config = CircuitConfig {
        header_comment: String::new(),
        ..Default::default()
    };
    let mut c = non_zero_circuit(config);
    let rel = write_relation(&mut c).unwrap();
    assert!(rel.starts_with("version 2.0.0;\ncircuit;\n@type field 2305843009213693951;\n@begin\n"));
    assert!(!rel.contains("//"));
}

#[test]
fn test_function_definitions_precede_top_level_gates() {
    let f = field();
    let mut c = Circuit::new();
    let sq = c
        .function("square", |fb| {
            let bf = fb.backend(&f);
            let input = fb.input(bf, 1);
            let out = fb.output(bf, 1);
            let x = fb.wire(input, 0);
            let y = fb.mul(bf, x, x).expr().unwrap();
            fb.assign(out, 0, y);
        })
        .unwrap();
    let bf = c.backend(&f);
    let fx = f.clone();
    let x = c.private(bf, move |_| Ok(fx.from_u64(3)));
    let outs = c.call(sq, vec![x.into()]);
    let y = c.wire(outs[0], 0);
    c.assert_eq(bf, y, f.from_u64(9));

    let rel = write_relation(&mut c).unwrap();
    let body = "  @function(square, @out: 0:1, @in: 0:1)\n    $0 <- @mul($1, $1);\n  @end\n";
    assert!(rel.contains(body), "relation was:\n{rel}");
    let def = rel.find("@function(square").unwrap();
    let call = rel.find("@call(square, $0);").unwrap();
    let new = rel.find("@new(").unwrap();
    assert!(def < new && new < call);
}

#[test]
fn test_relation_without_gates() {
    let mut c = Circuit::new();
    let rel = write_relation(&mut c).unwrap();
    assert!(!rel.contains("@new"));
    assert!(rel.ends_with("@begin\n@end\n"));
}

// ============================================================================
// Inputs
// ============================================================================

#[test]
fn test_private_input_text() {
    let f = field();
    let mut c = non_zero_circuit(CircuitConfig::default());
    let text = write_private_input(&mut c, &f).unwrap();
    assert_eq!(
        text,
        "version 2.0.0;\nprivate_input;\n@type field 2305843009213693951;\n@begin\n  <5>;\n  <1844674407370955161>;\n@end\n"
    );
}

#[test]
fn test_public_input_text() {
    let f = field();
    let mut c = Circuit::new();
    let bf = c.backend(&f);
    let p = c.public(bf, f.from_u64(42));
    let q = c.public(bf, f.from_i64(-1));
    let s = c.add(bf, p, q);
    c.assert_eq(bf, s, f.from_u64(41));

    let text = write_public_input(&mut c, &f).unwrap();
    assert_eq!(
        text,
        "version 2.0.0;\npublic_input;\n@type field 2305843009213693951;\n@begin\n  <42>;\n  <2305843009213693950>;\n@end\n"
    );
    assert!(write_private_input(&mut c, &f).unwrap().contains("@begin\n@end\n"));
}

#[test]
fn test_inputs_are_split_per_field() {
    let f0 = field();
    let f1 = Field::new(97u32);
    let mut c = Circuit::new();
    let b0 = c.backend(&f0);
    let b1 = c.backend(&f1);
    let (v0, v1) = (f0.clone(), f1.clone());
    let x = c.private(b0, move |_| Ok(v0.from_u64(11)));
    let y = c.private(b1, move |_| Ok(v1.from_u64(22)));
    c.live(b0, x);
    c.live(b1, y);

    let rel = write_relation(&mut c).unwrap();
    assert!(rel.contains("@type field 2305843009213693951;\n@type field 97;\n"));
    assert!(rel.contains("  @new(0: $0 ... $1);\n  @new(1: $0 ... $1);\n"));

    let p0 = write_private_input(&mut c, &f0).unwrap();
    let p1 = write_private_input(&mut c, &f1).unwrap();
    assert!(p0.contains("  <11>;\n@end"));
    assert!(!p0.contains("<22>"));
    assert!(p1.contains("@type field 97;\n@begin\n  <22>;\n@end"));
}

#[test]
fn test_write_dir() {
    let dir = std::env::temp_dir().join(format!("circus-export-{}", std::process::id()));
    let mut c = non_zero_circuit(CircuitConfig::default());
    write_dir(&mut c, &dir).unwrap();

    let rel = std::fs::read_to_string(dir.join("relation.txt")).unwrap();
    assert_eq!(rel, write_relation(&mut c).unwrap());
    let private = std::fs::read_to_string(dir.join("private.txt")).unwrap();
    assert!(private.contains("  <5>;"));
    assert!(dir.join("public.txt").exists());
    std::fs::remove_dir_all(&dir).unwrap();
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_defaults_from_empty_toml() {
    let config = CircuitConfig::from_toml_str("").unwrap();
    assert_eq!(config, CircuitConfig::default());
    assert_eq!(config.version, "2.0.0");
    assert_eq!(config.wire_offset, 0);
}

#[test]
fn test_config_overrides() {
    let config = CircuitConfig::from_toml_str(
        r#"
version = "2.1.0"
wire_offset = 16
header_comment = ""
"#,
    )
    .unwrap();
    assert_eq!(config.version, "2.1.0");
    assert_eq!(config.wire_offset, 16);
    assert!(config.header_comment.is_empty());

    let mut c = non_zero_circuit(config);
    let rel = write_relation(&mut c).unwrap();
    assert!(rel.starts_with("version 2.1.0;\ncircuit;\n@type field"));
    assert!(rel.contains("  @new(0: $16 ... $19);"));
}

#[test]
fn test_config_rejects_bad_values() {
    let err = CircuitConfig::from_toml_str("wire_offset = \"ten\"").unwrap_err();
    assert!(matches!(err, CircuitError::Config(_)));
}

#[test]
fn test_config_load_missing_file() {
    let err = CircuitConfig::load("/nonexistent/circus.toml").unwrap_err();
    assert!(matches!(err, CircuitError::Io(_)));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = CircuitConfig {
        version: "2.0.1".to_string(),
        wire_offset: 7,
        header_comment: "built by a \"quoted\" frontend".to_string(),
    };
    let text = toml::to_string(&config).unwrap();
    assert!(text.contains("wire_offset = 7"));
    assert_eq!(CircuitConfig::from_toml_str(&text).unwrap(), config);
}
