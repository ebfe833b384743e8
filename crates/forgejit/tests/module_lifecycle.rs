//! Integration tests for lookup, invocation and teardown of compiled modules.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use forgejit::{
    build_cranelift, ArgValue, CompiledModule, DeviceContext, ModuleError, Registry,
    BUILD_CRANELIFT,
};
use forgejit_test::fixtures;

#[test]
fn test_every_definition_is_resolvable() {
    for count in [1, 3, 8] {
        let module = CompiledModule::build(&fixtures::numbered_unit(count), "native").unwrap();
        assert_eq!(module.exported_symbols().len(), count);

        let mut out = [-1i64; 1];
        for i in 0..count {
            let f = module.get_function(&format!("f{i}")).unwrap().unwrap();
            unsafe { f.call(&[ArgValue::buffer(&mut out)]) }.unwrap();
            assert_eq!(out[0], i as i64);
        }
        assert_eq!(module.engine_builds(), 1);
    }
}

#[test]
fn test_repeated_lookup_shares_address() {
    let module = build_cranelift(&fixtures::arithmetic_unit(), "native").unwrap();
    let a = module.get_function("accumulate").unwrap().unwrap();
    let b = module.get_function("accumulate").unwrap().unwrap();
    assert_eq!(a.address(), b.address());

    let mut buf = [1i64, 2, 3];
    unsafe {
        a.call(&[ArgValue::buffer(&mut buf), 2i64.into(), 10i64.into()])
            .unwrap();
        b.call(&[ArgValue::buffer(&mut buf), 0i64.into(), (-1i64).into()])
            .unwrap();
    }
    assert_eq!(buf, [0, 2, 13]);
}

#[test]
fn test_missing_symbol_is_absent() {
    let module = build_cranelift(&fixtures::sum_into(), "native").unwrap();
    assert!(module.get_function("nonexistent").unwrap().is_none());
    assert!(module.get_function("").unwrap().is_none());
}

#[test]
fn test_pre_compile_missing_symbol_is_fatal() {
    let module = CompiledModule::build(&fixtures::arithmetic_unit(), "native").unwrap();

    let err = module
        .pre_compile("nonexistent", DeviceContext::default())
        .unwrap_err();
    assert!(matches!(err, ModuleError::SymbolNotFound(ref name) if name == "nonexistent"));

    module.pre_compile("clamp", DeviceContext::default()).unwrap();
    let clamp = module.get_function("clamp").unwrap().unwrap();
    let mut out = [0i64; 1];
    unsafe {
        clamp.call(&[
            ArgValue::buffer(&mut out),
            (-4i64).into(),
            0i64.into(),
            9i64.into(),
        ])
    }
    .unwrap();
    assert_eq!(out[0], 0);
    assert_eq!(module.engine_builds(), 1);
}

#[test]
fn test_concurrent_first_lookups_build_once() {
    const THREADS: usize = 8;
    let module = CompiledModule::build(&fixtures::arithmetic_unit(), "native").unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let module = Arc::clone(&module);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let name = if i % 4 == 3 { "absent" } else { "sum_into" };
                module
                    .get_function(name)
                    .unwrap()
                    .map(|f| f.address())
            })
        })
        .collect();

    let results: Vec<Option<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(module.engine_builds(), 1);

    let first = results.iter().flatten().next().copied().unwrap();
    for (i, result) in results.iter().enumerate() {
        if i % 4 == 3 {
            assert!(result.is_none());
        } else {
            assert_eq!(*result, Some(first));
        }
    }
}

#[test]
fn test_argument_mismatch_reports_failure() {
    let module = build_cranelift(&fixtures::sum_into(), "native").unwrap();
    let f = module.get_function("sum_into").unwrap().unwrap();
    let mut out = [0i64; 1];

    let err = unsafe { f.call(&[ArgValue::buffer(&mut out), 1i64.into()]) }.unwrap_err();
    match err {
        ModuleError::Invocation { status, message } => {
            assert_eq!(status, -1);
            assert_eq!(message, "expected 3 arguments, got 2");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = unsafe { f.call(&[ArgValue::buffer(&mut out), 1.5f64.into(), 2i64.into()]) }
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "function returned status -1: argument 1: expected type code int(0), got float(2)"
    );
    assert_eq!(out[0], 0);

    unsafe { f.call(&[ArgValue::buffer(&mut out), 1i64.into(), 2i64.into()]) }.unwrap();
    assert_eq!(out[0], 3);
}

#[test]
fn test_teardown_runs_finalizers() {
    static LOADED: AtomicI64 = AtomicI64::new(0);
    static UNLOADED: AtomicBool = AtomicBool::new(false);

    let module = build_cranelift(&fixtures::lifecycle_unit(), "native").unwrap();
    module
        .register_callback(fixtures::SLOT_LOAD, |x| LOADED.fetch_add(x, Ordering::SeqCst))
        .register_callback(fixtures::SLOT_UNLOAD, |_| {
            UNLOADED.store(true, Ordering::SeqCst);
            0
        });

    let f = module.get_function("sum_into").unwrap().unwrap();
    let mut out = [0i64; 1];
    unsafe { f.call(&[ArgValue::buffer(&mut out), 2i64.into(), 3i64.into()]) }.unwrap();
    assert_eq!(LOADED.load(Ordering::SeqCst), 1);
    assert!(!UNLOADED.load(Ordering::SeqCst));

    drop(module);
    assert!(!UNLOADED.load(Ordering::SeqCst), "handle still holds the module");
    drop(f);
    assert!(UNLOADED.load(Ordering::SeqCst));
    assert_eq!(LOADED.load(Ordering::SeqCst), 1);
}

#[test]
fn test_registry_entry_point() {
    forgejit::logging::init();
    forgejit::logging::init();

    let build = Registry::global().get(BUILD_CRANELIFT).unwrap();
    let module = build(&fixtures::callback_unit(), "cranelift -opt=speed").unwrap();
    module.register_callback(fixtures::SLOT_TRANSFORM, |x| x - 1);

    let transform = module.get_function("transform").unwrap().unwrap();
    let mut out = [0i64; 1];
    unsafe { transform.call(&[ArgValue::buffer(&mut out), 22i64.into()]) }.unwrap();
    assert_eq!(out[0], 42);

    let main = module.get_function("__forgejit_main__").unwrap().unwrap();
    let notify = module.get_function("notify").unwrap().unwrap();
    assert_eq!(main.address(), notify.address());
}
