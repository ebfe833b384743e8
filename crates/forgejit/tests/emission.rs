//! Integration tests for saving compiled modules to disk.

use std::sync::Arc;
use std::thread;

use forgejit::{
    build_cranelift, decode_bitcode, ArgValue, CompiledModule, ForgeConfig, ModuleError,
};
use forgejit_test::fixtures;
use tempfile::tempdir;

#[test]
fn test_textual_output_is_idempotent() {
    let dir = tempdir().unwrap();
    let module = build_cranelift(&fixtures::arithmetic_unit(), "native").unwrap();
    let first = dir.path().join("first.ll");
    let second = dir.path().join("second.ll");

    module.save_to_file(first.to_str().unwrap(), "").unwrap();
    module.save_to_file(second.to_str().unwrap(), "ll").unwrap();

    let a = std::fs::read(&first).unwrap();
    let b = std::fs::read(&second).unwrap();
    assert_eq!(a, b);
    assert_eq!(String::from_utf8(a).unwrap(), module.get_source("ll").unwrap());
}

#[test]
fn test_unknown_format_is_fatal() {
    let dir = tempdir().unwrap();
    let module = build_cranelift(&fixtures::sum_into(), "native").unwrap();
    let path = dir.path().join("unit.out");
    let path = path.to_str().unwrap();

    let err = module.save_to_file(path, "xyz").unwrap_err();
    match &err {
        ModuleError::UnknownFormat { path: p, format } => {
            assert_eq!(p, path);
            assert_eq!(format, "xyz");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        err.to_string(),
        format!("Do not know how to save file {path} with format='xyz'")
    );
}

#[test]
fn test_emission_alongside_invocation() {
    let dir = tempdir().unwrap();
    let module = CompiledModule::build(&fixtures::arithmetic_unit(), "native").unwrap();
    let before = module.get_source("").unwrap();

    let writer = {
        let module = Arc::clone(&module);
        let dir = dir.path().to_path_buf();
        thread::spawn(move || {
            for i in 0..4 {
                let path = dir.join(format!("unit{i}.o"));
                module.save_to_file(path.to_str().unwrap(), "").unwrap();
            }
        })
    };

    let sum = module.get_function("sum_into").unwrap().unwrap();
    let mut out = [0i64; 1];
    unsafe { sum.call(&[ArgValue::buffer(&mut out), 20i64.into(), 22i64.into()]) }.unwrap();
    writer.join().unwrap();

    assert_eq!(out[0], 42);
    assert_eq!(module.get_source("").unwrap(), before);
    let bc = dir.path().join("after.bc");
    module.save_to_file(bc.to_str().unwrap(), "").unwrap();
    assert!(std::fs::metadata(&bc).unwrap().len() > 0);
}

#[test]
fn test_bitcode_rebuilds_equivalent_module() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("unit.bc");
    let original = build_cranelift(&fixtures::arithmetic_unit(), "native").unwrap();
    original.save_to_file(path.to_str().unwrap(), "").unwrap();

    let bitcode = decode_bitcode(&std::fs::read(&path).unwrap()).unwrap();
    let rebuilt = build_cranelift(&bitcode.functions, &bitcode.target_spec).unwrap();
    assert_eq!(
        rebuilt.get_source("").unwrap(),
        original.get_source("").unwrap()
    );
}

#[test]
fn test_object_name_from_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("named.obj");
    let config = ForgeConfig::default().with_object_name("forgejit_unit");
    let module =
        CompiledModule::build_with_config(&fixtures::sum_into(), "native", config).unwrap();

    module.save_to_file(path.to_str().unwrap(), "").unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert!(!bytes.is_empty());
    #[cfg(target_os = "linux")]
    assert_eq!(&bytes[..4], b"\x7fELF");
}

#[test]
fn test_save_to_binary_is_fatal() {
    let module = build_cranelift(&fixtures::sum_into(), "native").unwrap();
    let mut sink: Vec<u8> = Vec::new();
    assert!(matches!(
        module.save_to_binary(&mut sink),
        Err(ModuleError::Unsupported(_))
    ));
}
