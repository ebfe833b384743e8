//! Tests for the packed calling convention.

use std::sync::Arc;

use super::*;
use crate::runtime::{set_last_error, STATUS_ARG_ERROR};

/// Host-written function with the packed signature: sums int arguments,
/// rejects anything else.
unsafe extern "C" fn sum_ints(values: *const ValueSlot, type_codes: *const i32, num_args: i32) -> i32 {
    let mut total = 0i64;
    for i in 0..num_args as usize {
        if *type_codes.add(i) != TypeCode::Int.as_i32() {
            set_last_error(format!("argument {i} is not an int"));
            return STATUS_ARG_ERROR;
        }
        total += (*values.add(i)).v_int64;
    }
    set_last_error(format!("total={total}"));
    0
}

fn host_func() -> PackedFunc {
    let module = Arc::new(CompiledModule::new());
    unsafe { PackedFunc::from_raw("sum_ints", sum_ints as *const u8, module) }
}

#[test]
fn test_packed_args_layout() {
    let mut buf = [0i64; 2];
    let packed = PackedArgs::new(&[
        ArgValue::Int(-3),
        ArgValue::UInt(7),
        ArgValue::Float(1.5),
        ArgValue::buffer(&mut buf),
    ]);

    assert_eq!(packed.len(), 4);
    assert_eq!(packed.type_codes(), &[0, 1, 2, 3]);
    assert_eq!(unsafe { packed.values[0].v_int64 }, -3);
    assert_eq!(unsafe { packed.values[2].v_float64 }, 1.5);
    assert_eq!(
        unsafe { packed.values[3].v_handle } as usize,
        buf.as_mut_ptr() as usize
    );
}

#[test]
fn test_value_slot_is_eight_bytes() {
    assert_eq!(std::mem::size_of::<ValueSlot>(), 8);
}

#[test]
fn test_call_success() {
    let f = host_func();
    unsafe { f.call(&[1i64.into(), 2i64.into(), 39i64.into()]) }.unwrap();
    assert_eq!(runtime::last_error(), "total=42");
}

#[test]
fn test_nonzero_status_becomes_error() {
    let f = host_func();
    let err = unsafe { f.call(&[ArgValue::Int(1), ArgValue::Float(2.0)]) }.unwrap_err();
    match err {
        ModuleError::Invocation { status, message } => {
            assert_eq!(status, STATUS_ARG_ERROR);
            assert_eq!(message, "argument 1 is not an int");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_clones_share_address() {
    let f = host_func();
    let g = f.clone();
    assert_eq!(f.address(), g.address());
    assert_eq!(g.name(), "sum_ints");
    assert!(format!("{g:?}").contains("sum_ints"));
}

#[test]
fn test_handle_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<PackedFunc>();

    let f = host_func();
    std::thread::spawn(move || unsafe { f.call(&[ArgValue::Int(1)]) }.unwrap())
        .join()
        .unwrap();
}
