//! Tests for file emission.

use forgejit_config::{CodegenConfig, ForgeConfig, ObjectConfig};
use forgejit_test::fixtures;
use tempfile::TempDir;

use super::*;
use crate::codegen::generate;
use crate::target::resolve;
use crate::unit::{decode_bitcode, CodeUnit};

fn setup() -> (CodeUnit, TargetDescriptor, TempDir) {
    let (target, _) = resolve("native", &ForgeConfig::default()).unwrap();
    let unit = generate(&fixtures::arithmetic_unit(), &target, &CodegenConfig::default()).unwrap();
    (unit, target, tempfile::tempdir().unwrap())
}

fn path_in(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

#[test]
fn test_text_written_twice_is_identical() {
    let (unit, target, dir) = setup();
    let first = path_in(&dir, "a.ll");
    let second = path_in(&dir, "b.ll");

    save_to_file(unit.view(), &target, &ObjectConfig::default(), &first, "").unwrap();
    save_to_file(unit.view(), &target, &ObjectConfig::default(), &second, "").unwrap();

    let a = std::fs::read(&first).unwrap();
    assert_eq!(a, std::fs::read(&second).unwrap());
    assert_eq!(String::from_utf8(a).unwrap(), unit.view().text());
}

#[test]
fn test_explicit_format_overrides_extension() {
    let (unit, target, dir) = setup();
    let path = path_in(&dir, "unit.txt");

    save_to_file(unit.view(), &target, &ObjectConfig::default(), &path, "clif").unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("; unit = sum_into"));
}

#[test]
fn test_bitcode_file_decodes() {
    let (unit, target, dir) = setup();
    let path = path_in(&dir, "unit.bc");

    save_to_file(unit.view(), &target, &ObjectConfig::default(), &path, "").unwrap();
    let decoded = decode_bitcode(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(decoded.functions, fixtures::arithmetic_unit());
}

#[test]
fn test_object_file_written() {
    let (unit, target, dir) = setup();
    let path = path_in(&dir, "unit.o");

    save_to_file(unit.view(), &target, &ObjectConfig::default(), &path, "").unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert!(!bytes.is_empty());
    #[cfg(target_os = "linux")]
    assert_eq!(&bytes[..4], b"\x7fELF");
}

#[test]
fn test_object_emission_after_transfer() {
    let (unit, target, _dir) = setup();
    let view = std::sync::Arc::clone(unit.view());
    drop(unit.into_parts());

    let bytes = emit_object(&view, &target, &ObjectConfig::default()).unwrap();
    assert!(!bytes.is_empty());
}

#[test]
fn test_unknown_format_names_path_and_format() {
    let (unit, target, dir) = setup();
    let path = path_in(&dir, "unit.xyz");

    let err = save_to_file(unit.view(), &target, &ObjectConfig::default(), &path, "").unwrap_err();
    let message = err.to_string();
    assert!(message.contains(&path));
    assert!(message.contains("format='xyz'"));
    assert!(!std::path::Path::new(&path).exists());
}

#[test]
fn test_open_failure_reports_path() {
    let (unit, target, dir) = setup();
    let path = path_in(&dir, "missing/unit.ll");

    let err = save_to_file(unit.view(), &target, &ObjectConfig::default(), &path, "").unwrap_err();
    assert!(matches!(err, ModuleError::FileOpen { .. }));
    assert!(err.to_string().starts_with(&format!("Cannot open file: {path}")));
}

#[test]
fn test_source_formats() {
    let (unit, _, _) = setup();
    let text = unit.view().text();

    assert_eq!(source(unit.view(), "").unwrap(), text);
    assert_eq!(source(unit.view(), "ll").unwrap(), text);
    assert_eq!(source(unit.view(), "clif").unwrap(), text);
    assert!(matches!(
        source(unit.view(), "asm"),
        Err(ModuleError::UnknownFormat { .. })
    ));
}
