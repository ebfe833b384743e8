//! Tests for lowering definitions into a unit.

use forgejit_config::{CodegenConfig, ForgeConfig};
use forgejit_core::{ArgKind, DefinitionError, Expr, FunctionDef, Stmt};
use forgejit_test::fixtures;

use super::generate;
use crate::error::ModuleError;
use crate::target::{resolve, TargetDescriptor};

fn host() -> TargetDescriptor {
    resolve("native", &ForgeConfig::default()).unwrap().0
}

#[test]
fn test_generates_one_body_per_definition() {
    let defs = fixtures::arithmetic_unit();
    let unit = generate(&defs, &host(), &CodegenConfig::default()).unwrap();

    assert_eq!(unit.len(), defs.len());
    let view = unit.view();
    assert_eq!(view.name(), "sum_into");
    let names: Vec<&str> = view
        .context()
        .generated()
        .iter()
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(names, ["sum_into", "clamp", "sign", "truncate", "accumulate"]);
}

#[test]
fn test_empty_definitions_rejected() {
    let err = generate(&[], &host(), &CodegenConfig::default()).unwrap_err();
    assert!(matches!(err, ModuleError::EmptyUnit));
}

#[test]
fn test_invalid_definition_rejected() {
    let defs = vec![FunctionDef::new("bad", vec![ArgKind::Int])
        .with_stmt(Stmt::store(0, Expr::int(0), Expr::int(1)))];
    let err = generate(&defs, &host(), &CodegenConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        ModuleError::Definition(DefinitionError::NotAHandle { .. })
    ));
}

#[test]
fn test_context_slot_only_with_callbacks() {
    let plain = generate(&fixtures::sum_into(), &host(), &CodegenConfig::default()).unwrap();
    assert!(!plain.view().context().has_context_slot());

    let calling = generate(&fixtures::callback_unit(), &host(), &CodegenConfig::default()).unwrap();
    assert!(calling.view().context().has_context_slot());
}

#[test]
fn test_prologue_checks_every_parameter() {
    let unit = generate(&fixtures::sum_into(), &host(), &CodegenConfig::default()).unwrap();
    let text = unit.view().functions()[0].display().to_string();

    // One call to the arg-error hook per check: the count plus three tags.
    assert_eq!(text.matches("call fn0(").count(), 4);
}

#[test]
fn test_unverified_generation() {
    let config = CodegenConfig { verify: false };
    let unit = generate(&fixtures::callback_unit(), &host(), &config).unwrap();
    assert_eq!(unit.len(), 2);
}
