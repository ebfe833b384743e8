//! Code units: the generated program and its ownership states.
//!
//! A unit exists in two shapes:
//!
//! - [`CodeUnit`] owns the function bodies the JIT engine consumes. It is moved
//!   into the engine exactly once and cannot be observed afterwards.
//! - [`UnitView`] is the shared, read-only observation kept by the module for
//!   emission and metadata queries. It stays valid before and after the move.
//!
//! Both point at the same [`UnitContext`], the declaration table every module
//! that materializes the unit (JIT or object) declares symbols from.

mod bitcode;

#[cfg(test)]
mod tests;

use std::fmt::Write as _;
use std::sync::Arc;

use cranelift_codegen::ir::{AbiParam, Function, Signature};
use cranelift_codegen::isa::CallConv;
use cranelift_codegen::ir::types::{I32, I64};
use cranelift_codegen::Context;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module, ModuleResult};
use forgejit_core::{FunctionDef, FunctionRole};

use crate::runtime::{ARG_ERROR_SYMBOL, CALLBACK_SYMBOL, MAIN_SYMBOL, MODULE_CTX_SYMBOL};
use crate::target::DataLayout;

pub use bitcode::{decode_bitcode, encode_bitcode, Bitcode, BITCODE_MAGIC, BITCODE_VERSION};

/// Declaration index of the argument-error import.
pub(crate) const ARG_ERROR_INDEX: usize = 0;
/// Declaration index of the callback import.
pub(crate) const CALLBACK_INDEX: usize = 1;
/// Declaration index of the first generated function.
pub(crate) const FIRST_FUNCTION_INDEX: usize = 2;
/// Data index of the context slot, when present.
pub(crate) const CTX_DATA_INDEX: usize = 1;

/// A function symbol of the unit.
///
/// Initializers and finalizers are local: only the engine calls them.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub linkage: Linkage,
    pub role: FunctionRole,
    pub signature: Signature,
}

impl FunctionDecl {
    pub fn is_exported(&self) -> bool {
        self.role == FunctionRole::Exported
    }
}

/// Initial contents of a data symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataInit {
    Zeroed(usize),
    Bytes(Vec<u8>),
}

/// A data symbol of the unit.
#[derive(Debug, Clone)]
pub struct DataDecl {
    pub name: String,
    pub linkage: Linkage,
    pub writable: bool,
    pub init: DataInit,
}

/// The first host-callable definition, which names the unit.
fn entry_def(defs: &[FunctionDef]) -> Option<&FunctionDef> {
    defs.iter().find(|d| d.role == FunctionRole::Exported)
}

/// Symbol table shared by a unit and every module that materializes it.
///
/// Generated IR refers to functions and data by their position here, so every
/// materialization declares them in exactly this order.
#[derive(Debug, Clone)]
pub struct UnitContext {
    functions: Vec<FunctionDecl>,
    data: Vec<DataDecl>,
    packed_signature: Signature,
}

impl UnitContext {
    /// Lays out the declarations for `defs`.
    pub(crate) fn new(defs: &[FunctionDef], call_conv: CallConv, pointer: cranelift_codegen::ir::Type) -> Self {
        let mut packed_signature = Signature::new(call_conv);
        packed_signature.params.push(AbiParam::new(pointer));
        packed_signature.params.push(AbiParam::new(pointer));
        packed_signature.params.push(AbiParam::new(I32));
        packed_signature.returns.push(AbiParam::new(I32));

        let mut arg_error = Signature::new(call_conv);
        arg_error.params.extend([AbiParam::new(I32); 4]);
        arg_error.returns.push(AbiParam::new(I32));

        let mut callback = Signature::new(call_conv);
        callback.params.push(AbiParam::new(I64));
        callback.params.push(AbiParam::new(I32));
        callback.params.push(AbiParam::new(I64));
        callback.returns.push(AbiParam::new(I64));

        let mut functions = vec![
            FunctionDecl {
                name: ARG_ERROR_SYMBOL.to_string(),
                linkage: Linkage::Import,
                role: FunctionRole::Exported,
                signature: arg_error,
            },
            FunctionDecl {
                name: CALLBACK_SYMBOL.to_string(),
                linkage: Linkage::Import,
                role: FunctionRole::Exported,
                signature: callback,
            },
        ];
        functions.extend(defs.iter().map(|def| FunctionDecl {
            name: def.name.clone(),
            linkage: match def.role {
                FunctionRole::Exported => Linkage::Export,
                FunctionRole::Initializer | FunctionRole::Finalizer => Linkage::Local,
            },
            role: def.role,
            signature: packed_signature.clone(),
        }));

        let mut entry_name = entry_def(defs)
            .map(|d| d.name.clone())
            .unwrap_or_default()
            .into_bytes();
        entry_name.push(0);
        let mut data = vec![DataDecl {
            name: MAIN_SYMBOL.to_string(),
            linkage: Linkage::Export,
            writable: false,
            init: DataInit::Bytes(entry_name),
        }];
        if defs.iter().any(FunctionDef::uses_callbacks) {
            data.push(DataDecl {
                name: MODULE_CTX_SYMBOL.to_string(),
                linkage: Linkage::Export,
                writable: true,
                init: DataInit::Zeroed(8),
            });
        }

        Self {
            functions,
            data,
            packed_signature,
        }
    }

    pub fn functions(&self) -> &[FunctionDecl] {
        &self.functions
    }

    pub fn data(&self) -> &[DataDecl] {
        &self.data
    }

    pub fn packed_signature(&self) -> &Signature {
        &self.packed_signature
    }

    /// Generated functions, in definition order.
    pub fn generated(&self) -> &[FunctionDecl] {
        &self.functions[FIRST_FUNCTION_INDEX..]
    }

    pub fn has_context_slot(&self) -> bool {
        self.data.len() > CTX_DATA_INDEX
    }

    /// Declares and defines every symbol in `module`, compiling `bodies` (one
    /// per generated function, in order).
    pub(crate) fn materialize<M: Module>(
        &self,
        module: &mut M,
        bodies: impl IntoIterator<Item = Function>,
    ) -> ModuleResult<Materialized> {
        let mut functions = Vec::with_capacity(self.functions.len());
        for (index, decl) in self.functions.iter().enumerate() {
            let id = module.declare_function(&decl.name, decl.linkage, &decl.signature)?;
            debug_assert_eq!(id.as_u32() as usize, index, "declaration order diverged");
            functions.push(id);
        }

        let mut data = Vec::with_capacity(self.data.len());
        for (index, decl) in self.data.iter().enumerate() {
            let id = module.declare_data(&decl.name, decl.linkage, decl.writable, false)?;
            debug_assert_eq!(id.as_u32() as usize, index, "declaration order diverged");
            let mut desc = DataDescription::new();
            match &decl.init {
                DataInit::Zeroed(size) => desc.define_zeroinit(*size),
                DataInit::Bytes(bytes) => desc.define(bytes.clone().into_boxed_slice()),
            }
            desc.set_align(8);
            module.define_data(id, &desc)?;
            data.push(id);
        }

        for (id, body) in functions[FIRST_FUNCTION_INDEX..].iter().zip(bodies) {
            let mut ctx = Context::for_function(body);
            module.define_function(*id, &mut ctx)?;
            module.clear_context(&mut ctx);
        }

        Ok(Materialized { functions, data })
    }
}

/// Ids a module assigned while materializing a unit.
#[derive(Debug, Clone)]
pub(crate) struct Materialized {
    pub functions: Vec<FuncId>,
    pub data: Vec<DataId>,
}

impl Materialized {
    pub fn generated(&self) -> &[FuncId] {
        &self.functions[FIRST_FUNCTION_INDEX..]
    }

    pub fn context_slot(&self) -> Option<DataId> {
        self.data.get(CTX_DATA_INDEX).copied()
    }
}

/// Read-only observation of a unit.
#[derive(Debug)]
pub struct UnitView {
    name: String,
    target_spec: String,
    target_triple: String,
    data_layout: DataLayout,
    context: Arc<UnitContext>,
    defs: Vec<FunctionDef>,
    functions: Vec<Function>,
}

impl UnitView {
    /// Unit name; the name of the entry function.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_spec(&self) -> &str {
        &self.target_spec
    }

    pub fn target_triple(&self) -> &str {
        &self.target_triple
    }

    pub fn data_layout(&self) -> &DataLayout {
        &self.data_layout
    }

    pub fn context(&self) -> &Arc<UnitContext> {
        &self.context
    }

    pub fn definitions(&self) -> &[FunctionDef] {
        &self.defs
    }

    /// Backend IR as generated, in definition order.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Names of functions with the given role, in definition order.
    pub fn names_with_role(&self, role: FunctionRole) -> impl Iterator<Item = &str> {
        self.defs
            .iter()
            .filter(move |d| d.role == role)
            .map(|d| d.name.as_str())
    }

    /// Textual form of the whole unit.
    pub fn text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "; unit = {}", self.name);
        let _ = writeln!(out, "; target = {}", self.target_triple);
        let _ = writeln!(out, "; datalayout = {}", self.data_layout);
        for decl in &self.context.data {
            let _ = writeln!(
                out,
                "; data {} {:?}{}",
                decl.name,
                decl.linkage,
                if decl.writable { " writable" } else { "" }
            );
        }
        for (decl, func) in self.context.generated().iter().zip(&self.functions) {
            let _ = write!(out, "\n; {}\n{}", decl.name, func);
        }
        out
    }
}

/// The owning form of a unit.
///
/// Not `Clone`: consuming it with [`CodeUnit::into_parts`] is the single
/// transfer into an engine.
#[derive(Debug)]
pub struct CodeUnit {
    bodies: Vec<Function>,
    view: Arc<UnitView>,
}

impl CodeUnit {
    pub(crate) fn new(
        target_spec: &str,
        target_triple: String,
        data_layout: DataLayout,
        context: UnitContext,
        defs: Vec<FunctionDef>,
        functions: Vec<Function>,
    ) -> Self {
        let view = UnitView {
            name: entry_def(&defs).map(|d| d.name.clone()).unwrap_or_default(),
            target_spec: target_spec.to_string(),
            target_triple,
            data_layout,
            context: Arc::new(context),
            defs,
            functions: functions.clone(),
        };
        Self {
            bodies: functions,
            view: Arc::new(view),
        }
    }

    pub fn view(&self) -> &Arc<UnitView> {
        &self.view
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Gives up ownership of the bodies; only the view survives.
    pub(crate) fn into_parts(self) -> (Vec<Function>, Arc<UnitView>) {
        (self.bodies, self.view)
    }
}
