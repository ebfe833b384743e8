//! Compiled modules for forgejit.
//!
//! A [`CompiledModule`] owns one generated code unit. It can write the unit to
//! disk as a native object, textual IR or portable bitcode, and it JIT-links the
//! unit on the first function lookup, handing out [`PackedFunc`] handles that
//! all share one calling convention:
//!
//! ```text
//! (values: *const ValueSlot, type_codes: *const i32, num_args: i32) -> status
//! ```
//!
//! Hosts normally reach modules through the [`registry`] and the opaque
//! [`Module`] handle.

pub mod bridge;
pub mod codegen;
pub mod emit;
pub mod engine;
pub mod error;
pub mod format;
pub mod logging;
mod module;
pub mod registry;
pub mod runtime;
pub mod target;
pub mod unit;

pub use bridge::{ArgValue, BackendPackedCFunc, PackedArgs, PackedFunc, ValueSlot};
pub use error::{ModuleError, Result};
pub use format::file_format;
pub use module::{CompiledModule, Module, ModuleNode, TYPE_KEY};
pub use registry::{build_cranelift, Registry, BUILD_CRANELIFT};
pub use runtime::{last_error, set_last_error, DeviceContext, HostCallback};
pub use target::{resolve as resolve_target, DataLayout, TargetDescriptor};
pub use unit::{decode_bitcode, Bitcode, CodeUnit, UnitView};

pub use forgejit_config::ForgeConfig;
pub use forgejit_core::{ArgKind, Expr, FunctionDef, FunctionRole, Stmt, TypeCode};
