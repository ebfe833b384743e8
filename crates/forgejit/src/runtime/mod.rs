//! Host runtime support linked into generated code.
//!
//! Generated functions import two host symbols:
//!
//! - [`ARG_ERROR_SYMBOL`]: records an argument count or type-code mismatch as the
//!   thread's last error and returns the failing status.
//! - [`CALLBACK_SYMBOL`]: dispatches `(context id, slot, arg)` to a callback
//!   registered on the module whose id generated code read from its context slot.
//!
//! The context slot holds a process-unique module id rather than a pointer, so a
//! stale id can only miss the registry, never dereference freed memory.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};

use forgejit_core::TypeCode;
use tracing::warn;


/// Writable pointer-sized slot receiving the owning module's context id.
pub const MODULE_CTX_SYMBOL: &str = "__forgejit_module_ctx";
/// Data symbol holding the NUL-terminated name of the entry function.
pub const MAIN_SYMBOL: &str = "__forgejit_main__";
pub const ARG_ERROR_SYMBOL: &str = "__forgejit_arg_error";
pub const CALLBACK_SYMBOL: &str = "__forgejit_callback";

/// `kind` passed to the arg-error hook for a wrong argument count.
pub const ARG_ERROR_COUNT: i32 = 0;
/// `kind` passed to the arg-error hook for a wrong type code.
pub const ARG_ERROR_TYPE_CODE: i32 = 1;

/// Status generated code returns after reporting an argument error.
pub const STATUS_ARG_ERROR: i32 = -1;

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Records the calling thread's most recent diagnostic.
pub fn set_last_error(message: impl Into<String>) {
    let message = message.into();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = message);
}

/// Returns the calling thread's most recent diagnostic.
pub fn last_error() -> String {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

pub(crate) fn clear_last_error() {
    LAST_ERROR.with(|slot| slot.borrow_mut().clear());
}

/// Identifies the device a function is prepared for.
///
/// Compiled modules only run on the host CPU; the context travels along for
/// logging and for host runtimes that dispatch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceContext {
    pub device_type: i32,
    pub device_id: i32,
}

impl DeviceContext {
    pub const CPU: i32 = 1;

    pub fn cpu(device_id: i32) -> Self {
        Self {
            device_type: Self::CPU,
            device_id,
        }
    }
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self::cpu(0)
    }
}

/// A host function generated code may call through [`CALLBACK_SYMBOL`].
pub type HostCallback = Arc<dyn Fn(i64) -> i64 + Send + Sync>;

/// Callbacks registered on one module, indexed by slot.
#[derive(Default)]
pub struct CallbackTable {
    slots: RwLock<HashMap<u32, HostCallback>>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `slot`, returning the callback it replaced.
    pub fn register(&self, slot: u32, callback: HostCallback) -> Option<HostCallback> {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot, callback)
    }

    pub fn get(&self, slot: u32) -> Option<HostCallback> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&slot)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

fn contexts() -> &'static RwLock<HashMap<u64, Weak<CallbackTable>>> {
    static CONTEXTS: OnceLock<RwLock<HashMap<u64, Weak<CallbackTable>>>> = OnceLock::new();
    CONTEXTS.get_or_init(Default::default)
}

/// Registers a callback table and returns the id generated code will carry.
/// Ids are never zero and never reused within a process.
pub(crate) fn register_context(table: &Arc<CallbackTable>) -> u64 {
    let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
    contexts()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, Arc::downgrade(table));
    id
}

pub(crate) fn unregister_context(id: u64) {
    contexts()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
}

#[cfg(test)]
pub(crate) fn is_context_registered(id: u64) -> bool {
    contexts()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(&id)
}

/// Address/name pairs the JIT linker resolves imports against.
pub(crate) fn host_symbols() -> [(&'static str, *const u8); 2] {
    [
        (ARG_ERROR_SYMBOL, arg_error as *const u8),
        (CALLBACK_SYMBOL, dispatch_callback as *const u8),
    ]
}

pub(crate) extern "C" fn arg_error(kind: i32, index: i32, expected: i32, actual: i32) -> i32 {
    let message = match kind {
        ARG_ERROR_COUNT => format!("expected {expected} arguments, got {actual}"),
        ARG_ERROR_TYPE_CODE => format!(
            "argument {index}: expected type code {}, got {}",
            describe_code(expected),
            describe_code(actual)
        ),
        other => format!("argument error of unknown kind {other}"),
    };
    set_last_error(message);
    STATUS_ARG_ERROR
}

fn describe_code(code: i32) -> String {
    match TypeCode::from_i32(code) {
        Some(tc) => format!("{tc}({code})"),
        None => format!("unknown({code})"),
    }
}

pub(crate) extern "C" fn dispatch_callback(context: u64, slot: u32, arg: i64) -> i64 {
    let table = contexts()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&context)
        .and_then(Weak::upgrade);
    let Some(table) = table else {
        warn!(event = "callback_unknown_context", context, slot);
        set_last_error(format!("callback slot {slot}: no module registered for context {context}"));
        return 0;
    };
    let Some(callback) = table.get(slot) else {
        warn!(event = "callback_unknown_slot", context, slot);
        set_last_error(format!("callback slot {slot}: nothing registered"));
        return 0;
    };
    // Unwinding into generated frames is not allowed.
    match catch_unwind(AssertUnwindSafe(|| callback(arg))) {
        Ok(value) => value,
        Err(_) => {
            warn!(event = "callback_panicked", context, slot);
            set_last_error(format!("callback slot {slot} panicked"));
            0
        }
    }
}
