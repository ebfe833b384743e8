//! The JIT execution engine of a compiled module.
//!
//! An [`Engine`] is built from a [`CodeUnit`] exactly once, consuming it. It owns
//! the finalized machine code until it is dropped.
//!
//! # Teardown
//!
//! Dropping an engine runs the unit's finalizers in reverse declaration order,
//! unregisters the module's callback context, and only then releases the code
//! memory.
//!
//! Initializers and finalizers never appear in the lookup table; the engine is
//! their only caller.


use std::collections::HashMap;
use std::sync::Arc;

use cranelift_jit::{JITBuilder, JITModule};
use forgejit_config::JitConfig;
use forgejit_core::FunctionRole;
use tracing::{debug, info, warn};

use crate::bridge::call_nullary;
use crate::error::{ModuleError, Result};
use crate::runtime::{self, CallbackTable, MAIN_SYMBOL};
use crate::target::{host_isa, DataLayout};
use crate::unit::{CodeUnit, UnitView};

/// Finalized machine code of one unit.
pub struct Engine {
    module: Option<JITModule>,
    triple: String,
    addresses: HashMap<String, *const u8>,
    hooks: HashMap<String, *const u8>,
    finalizers: Vec<(String, *const u8)>,
    context_id: Option<u64>,
    callbacks: Arc<CallbackTable>,
}

// SAFETY: the JIT module is only touched at construction and drop. Addresses
// point into code memory that is immutable after finalization.
unsafe impl Send for Engine {}
unsafe impl Sync for Engine {}

impl Engine {
    /// Links `unit` for execution on the host.
    ///
    /// Fails without running anything if the host ISA lays out data
    /// differently from the unit. Initializers run before this returns; the
    /// first non-zero status aborts construction.
    pub fn build(unit: CodeUnit, config: &JitConfig, callbacks: &Arc<CallbackTable>) -> Result<Self> {
        let (bodies, view) = unit.into_parts();
        let triple = view.target_triple().to_string();
        info!(
            event = "engine_build_start",
            unit = %view.name(),
            triple = %triple,
            functions = bodies.len()
        );

        let isa = host_isa(config).map_err(|reason| ModuleError::EngineBuild {
            triple: triple.clone(),
            reason,
        })?;
        let engine_layout = DataLayout::of(&*isa);
        if &engine_layout != view.data_layout() {
            return Err(ModuleError::DataLayoutMismatch {
                module: view.data_layout().to_string(),
                engine: engine_layout.to_string(),
            });
        }

        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        for (name, addr) in runtime::host_symbols() {
            builder.symbol(name, addr);
        }

        let mut engine = Engine {
            module: Some(JITModule::new(builder)),
            triple,
            addresses: HashMap::new(),
            hooks: HashMap::new(),
            finalizers: Vec::new(),
            context_id: None,
            callbacks: Arc::clone(callbacks),
        };
        engine.link(&view, bodies)?;
        engine.run_initializers(&view)?;
        engine.finalizers = view
            .names_with_role(FunctionRole::Finalizer)
            .filter_map(|name| engine.hooks.get(name).map(|a| (name.to_string(), *a)))
            .collect();

        info!(
            event = "engine_built",
            unit = %view.name(),
            triple = %engine.triple,
            symbols = engine.addresses.len(),
            finalizers = engine.finalizers.len()
        );
        Ok(engine)
    }

    fn link(&mut self, view: &UnitView, bodies: Vec<cranelift_codegen::ir::Function>) -> Result<()> {
        let triple = self.triple.clone();
        let engine_err = |reason: String| ModuleError::EngineBuild {
            triple: triple.clone(),
            reason,
        };
        let Some(module) = self.module.as_mut() else {
            return Err(engine_err("engine already released".to_string()));
        };

        let context = view.context();
        let ids = context
            .materialize(module, bodies)
            .map_err(|e| engine_err(e.to_string()))?;
        module
            .finalize_definitions()
            .map_err(|e| engine_err(e.to_string()))?;

        for (decl, id) in context.generated().iter().zip(ids.generated()) {
            let addr = module.get_finalized_function(*id);
            let table = if decl.is_exported() {
                &mut self.addresses
            } else {
                &mut self.hooks
            };
            table.insert(decl.name.clone(), addr);
        }
        if let Some(entry) = context.generated().iter().find(|d| d.is_exported()) {
            let addr = self.addresses[&entry.name];
            self.addresses.insert(MAIN_SYMBOL.to_string(), addr);
        }

        if let Some(slot) = ids.context_slot() {
            let (ptr, len) = module.get_finalized_data(slot);
            if len < std::mem::size_of::<u64>() {
                return Err(engine_err(format!("context slot is {len} bytes")));
            }
            let id = runtime::register_context(&self.callbacks);
            // SAFETY: the slot is writable, 8-aligned and at least 8 bytes long.
            unsafe { ptr.cast_mut().cast::<u64>().write(id) };
            self.context_id = Some(id);
            debug!(event = "context_slot_written", context = id);
        }
        Ok(())
    }

    fn run_initializers(&self, view: &UnitView) -> Result<()> {
        for name in view.names_with_role(FunctionRole::Initializer) {
            let Some(addr) = self.hooks.get(name) else {
                return Err(ModuleError::SymbolNotFound(name.to_string()));
            };
            // SAFETY: initializers are generated with the packed signature and
            // take no arguments.
            let status = unsafe { call_nullary(*addr) };
            if status != 0 {
                return Err(ModuleError::Initializer {
                    name: name.to_string(),
                    status,
                    message: runtime::last_error(),
                });
            }
            debug!(event = "initializer_ran", function = %name);
        }
        Ok(())
    }

    /// Address of an exported function, or `None` if the unit exports no such
    /// symbol.
    pub fn lookup(&self, name: &str) -> Option<*const u8> {
        self.addresses.get(name).copied()
    }

    pub fn triple(&self) -> &str {
        &self.triple
    }

    /// Number of resolvable symbols, including the entry alias.
    pub fn symbol_count(&self) -> usize {
        self.addresses.len()
    }

    pub fn context_id(&self) -> Option<u64> {
        self.context_id
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for (name, addr) in self.finalizers.iter().rev() {
            // SAFETY: finalizers are nullary packed functions in live code.
            let status = unsafe { call_nullary(*addr) };
            if status != 0 {
                warn!(
                    event = "finalizer_failed",
                    function = %name,
                    status,
                    message = %runtime::last_error()
                );
            }
        }
        if let Some(id) = self.context_id.take() {
            runtime::unregister_context(id);
        }
        if let Some(module) = self.module.take() {
            // SAFETY: no handle to this code outlives the engine; handles keep
            // the owning module, and therefore this engine, alive.
            unsafe { module.free_memory() };
        }
        info!(event = "engine_released", triple = %self.triple);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("triple", &self.triple)
            .field("symbols", &self.addresses.len())
            .field("finalizers", &self.finalizers.len())
            .field("context_id", &self.context_id)
            .finish()
    }
}
