//! Packed calling convention and invocation handles.
//!
//! Every generated function has the same native signature:
//!
//! ```text
//! extern "C" fn(values: *const ValueSlot, type_codes: *const i32, num_args: i32) -> i32
//! ```
//!
//! One trampoline shape covers every host-level signature: the callee checks
//! `num_args` and each type code before reading a slot, and reports a mismatch
//! through a non-zero status plus the thread's last error.
//!
//! This is the only module that turns raw code addresses into calls.

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use forgejit_core::TypeCode;

use crate::error::{ModuleError, Result};
use crate::module::CompiledModule;
use crate::runtime;

#[cfg(test)]
mod tests;

/// One 8-byte argument slot. The matching type code says which field is live.
#[repr(C)]
#[derive(Clone, Copy)]
pub union ValueSlot {
    pub v_int64: i64,
    pub v_float64: f64,
    pub v_handle: *mut c_void,
}

impl fmt::Debug for ValueSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SAFETY: every bit pattern is a valid i64.
        write!(f, "ValueSlot({:#x})", unsafe { self.v_int64 })
    }
}

/// Native signature of every generated function.
pub type BackendPackedCFunc =
    unsafe extern "C" fn(values: *const ValueSlot, type_codes: *const i32, num_args: i32) -> i32;

/// A host-side argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Handle(*mut c_void),
}

impl ArgValue {
    /// Passes an `i64` buffer by address. The buffer must outlive the call.
    pub fn buffer(data: &mut [i64]) -> Self {
        ArgValue::Handle(data.as_mut_ptr().cast())
    }

    pub fn type_code(&self) -> TypeCode {
        match self {
            ArgValue::Int(_) => TypeCode::Int,
            ArgValue::UInt(_) => TypeCode::UInt,
            ArgValue::Float(_) => TypeCode::Float,
            ArgValue::Handle(_) => TypeCode::Handle,
        }
    }

    fn to_slot(self) -> ValueSlot {
        match self {
            ArgValue::Int(v) => ValueSlot { v_int64: v },
            ArgValue::UInt(v) => ValueSlot { v_int64: v as i64 },
            ArgValue::Float(v) => ValueSlot { v_float64: v },
            ArgValue::Handle(p) => ValueSlot { v_handle: p },
        }
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        ArgValue::UInt(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

/// Parallel slot and type-code arrays in the layout generated code reads.
#[derive(Debug, Clone, Default)]
pub struct PackedArgs {
    values: Vec<ValueSlot>,
    type_codes: Vec<i32>,
}

impl PackedArgs {
    pub fn new(args: &[ArgValue]) -> Self {
        Self {
            values: args.iter().map(|a| a.to_slot()).collect(),
            type_codes: args.iter().map(|a| a.type_code().as_i32()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn type_codes(&self) -> &[i32] {
        &self.type_codes
    }
}

/// A callable bound to one resolved generated function.
///
/// Holds a shared reference to the owning module, so the code it points at
/// stays mapped for as long as any clone of the handle exists. Calls take no
/// lock.
#[derive(Clone)]
pub struct PackedFunc {
    name: Arc<str>,
    func: BackendPackedCFunc,
    _module: Arc<CompiledModule>,
}

// SAFETY: the code behind `func` is immutable once finalized and lives as long
// as `_module`; generated functions keep no per-call state of their own.
unsafe impl Send for PackedFunc {}
unsafe impl Sync for PackedFunc {}

impl PackedFunc {
    /// Wraps a finalized code address.
    ///
    /// # Safety
    ///
    /// `addr` must be the entry of a function with the packed signature whose
    /// code is owned by `module`'s engine.
    pub(crate) unsafe fn from_raw(
        name: &str,
        addr: *const u8,
        module: Arc<CompiledModule>,
    ) -> Self {
        let func: BackendPackedCFunc = std::mem::transmute(addr);
        Self {
            name: Arc::from(name),
            func,
            _module: module,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native entry address; equal for every handle to the same symbol.
    pub fn address(&self) -> usize {
        self.func as usize
    }

    /// Calls the function, translating a non-zero status into an error that
    /// carries the thread's last recorded diagnostic.
    ///
    /// Generated code checks the argument count and type codes, nothing more.
    ///
    /// # Safety
    ///
    /// Every handle argument must point to a live `i64` buffer, and every index
    /// the function reads or writes through it must be in bounds.
    ///
    /// ```compile_fail
    /// fn run(f: &forgejit::PackedFunc) {
    ///     let _ = f.call(&[forgejit::ArgValue::Int(1)]);
    /// }
    /// ```
    pub unsafe fn call(&self, args: &[ArgValue]) -> Result<()> {
        let packed = PackedArgs::new(args);
        let status = self.call_packed(
            packed.values.as_ptr(),
            packed.type_codes.as_ptr(),
            packed.len() as i32,
        );
        if status != 0 {
            return Err(ModuleError::Invocation {
                status,
                message: runtime::last_error(),
            });
        }
        Ok(())
    }

    /// Calls the function with caller-built arrays and returns the raw status.
    ///
    /// # Safety
    ///
    /// `values` and `type_codes` must each point to at least `num_args`
    /// readable elements, and any handle slot must satisfy the callee.
    pub unsafe fn call_packed(
        &self,
        values: *const ValueSlot,
        type_codes: *const i32,
        num_args: i32,
    ) -> i32 {
        runtime::clear_last_error();
        (self.func)(values, type_codes, num_args)
    }
}

impl fmt::Debug for PackedFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackedFunc")
            .field("name", &self.name)
            .field("address", &format_args!("{:#x}", self.address()))
            .finish()
    }
}

/// Calls a function that takes no arguments, such as an initializer.
///
/// # Safety
///
/// `addr` must be a live packed-signature function.
pub(crate) unsafe fn call_nullary(addr: *const u8) -> i32 {
    let func: BackendPackedCFunc = std::mem::transmute(addr);
    runtime::clear_last_error();
    func(std::ptr::null(), std::ptr::null(), 0)
}
