//! Tests for unit layout, textual form and bitcode.

use forgejit_config::{CodegenConfig, ForgeConfig};
use forgejit_core::FunctionRole;
use forgejit_test::fixtures;

use super::*;
use crate::codegen::generate;
use crate::error::ModuleError;
use crate::target::resolve;

fn unit_for(defs: &[FunctionDef]) -> CodeUnit {
    let (target, _) = resolve("native", &ForgeConfig::default()).unwrap();
    generate(defs, &target, &CodegenConfig::default()).unwrap()
}

#[test]
fn test_declaration_order() {
    let unit = unit_for(&fixtures::callback_unit());
    let context = unit.view().context();

    let functions: Vec<&str> = context.functions().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(
        functions,
        [ARG_ERROR_SYMBOL, CALLBACK_SYMBOL, "notify", "transform"]
    );
    assert_eq!(context.functions()[ARG_ERROR_INDEX].linkage, Linkage::Import);
    assert_eq!(context.generated()[0].linkage, Linkage::Export);

    let data: Vec<&str> = context.data().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(data, [MAIN_SYMBOL, MODULE_CTX_SYMBOL]);
    assert!(context.data()[CTX_DATA_INDEX].writable);
    assert_eq!(context.data()[CTX_DATA_INDEX].init, DataInit::Zeroed(8));
}

#[test]
fn test_entry_name_is_nul_terminated() {
    let unit = unit_for(&fixtures::arithmetic_unit());
    let main = &unit.view().context().data()[0];
    assert_eq!(main.init, DataInit::Bytes(b"sum_into\0".to_vec()));
    assert!(!main.writable);
}

#[test]
fn test_text_header_and_bodies() {
    let unit = unit_for(&fixtures::arithmetic_unit());
    let view = unit.view();
    let text = view.text();

    assert!(text.starts_with("; unit = sum_into\n"));
    assert!(text.contains(&format!("; target = {}", view.target_triple())));
    assert!(text.contains(&format!("; datalayout = {}", view.data_layout())));
    assert!(text.contains("; data __forgejit_main__ Export"));
    for name in ["sum_into", "clamp", "sign", "truncate", "accumulate"] {
        assert!(text.contains(&format!("\n; {name}\n")), "missing {name}");
    }
    assert_eq!(text, view.text());
}

#[test]
fn test_view_survives_transfer() {
    let unit = unit_for(&fixtures::sum_into());
    let before = unit.view().text();
    let (bodies, view) = unit.into_parts();

    assert_eq!(bodies.len(), 1);
    assert_eq!(view.text(), before);
}

#[test]
fn test_names_with_role() {
    let unit = unit_for(&fixtures::lifecycle_unit());
    let view = unit.view();

    let init: Vec<&str> = view.names_with_role(FunctionRole::Initializer).collect();
    let fini: Vec<&str> = view.names_with_role(FunctionRole::Finalizer).collect();
    assert_eq!(init, ["on_load"]);
    assert_eq!(fini, ["on_unload"]);
}

#[test]
fn test_lifecycle_functions_are_local() {
    let mut defs = fixtures::lifecycle_unit();
    defs.rotate_left(1);
    let unit = unit_for(&defs);
    let context = unit.view().context();

    let linkage: Vec<(&str, Linkage)> = context
        .generated()
        .iter()
        .map(|d| (d.name.as_str(), d.linkage))
        .collect();
    assert_eq!(
        linkage,
        [
            ("on_load", Linkage::Local),
            ("on_unload", Linkage::Local),
            ("sum_into", Linkage::Export),
        ]
    );
    assert_eq!(context.data()[0].init, DataInit::Bytes(b"sum_into\0".to_vec()));
    assert_eq!(unit.view().name(), "sum_into");
}

#[test]
fn test_bitcode_round_trip() {
    let defs = fixtures::arithmetic_unit();
    let unit = unit_for(&defs);
    let bytes = encode_bitcode(unit.view()).unwrap();

    assert_eq!(&bytes[..4], BITCODE_MAGIC);
    let decoded = decode_bitcode(&bytes).unwrap();
    assert_eq!(decoded.name, "sum_into");
    assert_eq!(decoded.functions, defs);
    assert_eq!(&decoded.data_layout, unit.view().data_layout());
}

#[test]
fn test_bitcode_rejects_garbage() {
    let err = decode_bitcode(b"ELF\x7f....").unwrap_err();
    assert!(matches!(err, ModuleError::Bitcode(_)));

    let mut bytes = encode_bitcode(unit_for(&fixtures::sum_into()).view()).unwrap();
    bytes[4] = 99;
    let err = decode_bitcode(&bytes).unwrap_err();
    assert!(err.to_string().contains("unsupported bitcode version 99"));
}
