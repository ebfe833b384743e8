//! The compiled module: a code unit, its lazily built engine, and emission.
//!
//! # Lifecycle
//!
//! ```text
//! new() --init--> Unbuilt(CodeUnit) --first lookup--> Ready(Engine)
//!                                                 \-> Failed(reason)
//! ```
//!
//! Emission (`save_to_file`, `get_source`) reads the shared [`UnitView`] and
//! never touches the engine lock, so it runs concurrently with lookups before
//! and after the unit moves into the engine.

mod node;


use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use forgejit_config::ForgeConfig;
use forgejit_core::FunctionDef;
use tracing::{debug, error, info};

use crate::bridge::PackedFunc;
use crate::codegen;
use crate::emit;
use crate::engine::Engine;
use crate::error::{ModuleError, Result};
use crate::runtime::{CallbackTable, DeviceContext, HostCallback};
use crate::target::{self, TargetDescriptor};
use crate::unit::{CodeUnit, UnitView};

pub use node::{Module, ModuleNode};

/// Module kind reported by [`CompiledModule::type_key`].
pub const TYPE_KEY: &str = "cranelift";

enum EngineState {
    Uninitialized,
    Unbuilt(CodeUnit),
    Ready(Engine),
    Failed(String),
}

/// A generated code unit that is emitted to files on request and JIT-linked
/// on first lookup.
pub struct CompiledModule {
    config: ForgeConfig,
    unit: Option<Arc<UnitView>>,
    target: Option<TargetDescriptor>,
    target_triple: String,
    state: Mutex<EngineState>,
    callbacks: Arc<CallbackTable>,
    builds: AtomicUsize,
}

impl CompiledModule {
    /// Creates an empty module with default configuration.
    pub fn new() -> Self {
        Self::with_config(ForgeConfig::default())
    }

    pub fn with_config(config: ForgeConfig) -> Self {
        Self {
            config,
            unit: None,
            target: None,
            target_triple: String::new(),
            state: Mutex::new(EngineState::Uninitialized),
            callbacks: Arc::new(CallbackTable::new()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Generates the unit for `defs` on `target`. May be called once.
    ///
    /// The first definition is the entry function.
    pub fn init(&mut self, defs: &[FunctionDef], target: &str) -> Result<()> {
        if self.unit.is_some() {
            return Err(ModuleError::AlreadyInitialized);
        }
        if defs.is_empty() {
            return Err(ModuleError::EmptyUnit);
        }
        self.config.validate()?;

        let (descriptor, triple) = target::resolve(target, &self.config)?;
        let unit = codegen::generate(defs, &descriptor, &self.config.codegen)?;
        info!(
            event = "module_init",
            unit = %unit.view().name(),
            functions = unit.len(),
            triple = %triple,
            layout = %unit.view().data_layout()
        );

        self.unit = Some(Arc::clone(unit.view()));
        self.target = Some(descriptor);
        self.target_triple = triple;
        *self.state.get_mut().unwrap_or_else(PoisonError::into_inner) = EngineState::Unbuilt(unit);
        Ok(())
    }

    /// Creates and initializes a shared module.
    pub fn build(defs: &[FunctionDef], target: &str) -> Result<Arc<Self>> {
        Self::build_with_config(defs, target, ForgeConfig::default())
    }

    pub fn build_with_config(
        defs: &[FunctionDef],
        target: &str,
        config: ForgeConfig,
    ) -> Result<Arc<Self>> {
        let mut module = Self::with_config(config);
        module.init(defs, target)?;
        Ok(Arc::new(module))
    }

    /// Runs `f` against the engine, building it first if this is the first
    /// lookup. Concurrent first lookups wait for the one build.
    fn with_engine<T>(&self, f: impl FnOnce(&Engine) -> T) -> Result<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, EngineState::Unbuilt(_)) {
            if let EngineState::Unbuilt(unit) =
                std::mem::replace(&mut *state, EngineState::Uninitialized)
            {
                self.builds.fetch_add(1, Ordering::SeqCst);
                match Engine::build(unit, &self.config.jit, &self.callbacks) {
                    Ok(engine) => *state = EngineState::Ready(engine),
                    Err(err) => {
                        error!(
                            event = "engine_build_failed",
                            triple = %self.target_triple,
                            error = %err
                        );
                        *state = EngineState::Failed(err.to_string());
                        return Err(err);
                    }
                }
            }
        }

        match &*state {
            EngineState::Ready(engine) => Ok(f(engine)),
            EngineState::Failed(reason) => Err(ModuleError::EngineFailed(reason.clone())),
            EngineState::Uninitialized | EngineState::Unbuilt(_) => {
                Err(ModuleError::NotInitialized)
            }
        }
    }

    /// Resolves `name` ahead of a call, building the engine if needed.
    pub fn pre_compile(&self, name: &str, device: DeviceContext) -> Result<()> {
        let addr = self.with_engine(|engine| engine.lookup(name))?;
        if addr.is_none() {
            return Err(ModuleError::SymbolNotFound(name.to_string()));
        }
        debug!(
            event = "precompiled",
            function = %name,
            device_type = device.device_type,
            device_id = device.device_id
        );
        Ok(())
    }

    /// Returns a handle to the generated function `name`, or `None` if the
    /// unit does not export it.
    ///
    /// The handle keeps this module alive.
    pub fn get_function(self: &Arc<Self>, name: &str) -> Result<Option<PackedFunc>> {
        let Some(addr) = self.with_engine(|engine| engine.lookup(name))? else {
            debug!(event = "symbol_absent", function = %name);
            return Ok(None);
        };
        debug!(event = "symbol_resolved", function = %name);
        // SAFETY: the engine generated `addr` with the packed signature and
        // the handle holds this module, which owns the engine.
        Ok(Some(unsafe { PackedFunc::from_raw(name, addr, Arc::clone(self)) }))
    }

    /// Writes the unit to `path`. `format` may be empty to use the path's
    /// extension.
    pub fn save_to_file(&self, path: &str, format: &str) -> Result<()> {
        let (view, target) = self.observed()?;
        emit::save_to_file(view, target, &self.config.object, path, format)
    }

    /// Textual form of the unit. Formats other than `""`, `ll` and `clif` are
    /// a [`ModuleError::UnknownFormat`] error.
    pub fn get_source(&self, format: &str) -> Result<String> {
        let (view, _) = self.observed()?;
        emit::source(view, format)
    }

    /// Always fails: the module can only be persisted through
    /// [`save_to_file`](Self::save_to_file).
    pub fn save_to_binary(&self, _stream: &mut dyn Write) -> Result<()> {
        Err(ModuleError::Unsupported(
            "CompiledModule: SaveToBinary not supported",
        ))
    }

    /// Registers a host callback generated code can reach under `slot`.
    ///
    /// Registration may happen before or after the engine is built.
    pub fn register_callback(&self, slot: u32, callback: HostCallback) {
        self.callbacks.register(slot, callback);
    }

    fn observed(&self) -> Result<(&UnitView, &TargetDescriptor)> {
        match (&self.unit, &self.target) {
            (Some(view), Some(target)) => Ok((view, target)),
            _ => Err(ModuleError::NotInitialized),
        }
    }

    /// Number of engine constructions attempted. Never exceeds one.
    pub fn engine_builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn is_built(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            EngineState::Ready(_)
        )
    }

    /// Names of the host-callable functions, in definition order.
    pub fn exported_symbols(&self) -> Vec<String> {
        self.unit
            .as_ref()
            .map(|view| {
                view.context()
                    .generated()
                    .iter()
                    .filter(|decl| decl.is_exported())
                    .map(|decl| decl.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn unit(&self) -> Option<&Arc<UnitView>> {
        self.unit.as_ref()
    }

    /// Triple the unit was generated for; empty before `init`.
    pub fn target_triple(&self) -> &str {
        &self.target_triple
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn type_key(&self) -> &'static str {
        TYPE_KEY
    }
}

impl Default for CompiledModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CompiledModule {
    fn drop(&mut self) {
        if self.unit.is_some() {
            info!(
                event = "module_teardown",
                triple = %self.target_triple,
                built = matches!(
                    *self.state.get_mut().unwrap_or_else(PoisonError::into_inner),
                    EngineState::Ready(_)
                )
            );
        }
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("unit", &self.unit.as_ref().map(|u| u.name().to_string()))
            .field("target_triple", &self.target_triple)
            .field("engine_builds", &self.engine_builds())
            .finish()
    }
}

impl ModuleNode for CompiledModule {
    fn type_key(&self) -> &'static str {
        TYPE_KEY
    }

    fn pre_compile(&self, name: &str, device: DeviceContext) -> Result<()> {
        CompiledModule::pre_compile(self, name, device)
    }

    fn get_function(self: Arc<Self>, name: &str) -> Result<Option<PackedFunc>> {
        CompiledModule::get_function(&self, name)
    }

    fn save_to_file(&self, path: &str, format: &str) -> Result<()> {
        CompiledModule::save_to_file(self, path, format)
    }

    fn get_source(&self, format: &str) -> Result<String> {
        CompiledModule::get_source(self, format)
    }

    fn save_to_binary(&self, stream: &mut dyn Write) -> Result<()> {
        CompiledModule::save_to_binary(self, stream)
    }

    fn register_callback(&self, slot: u32, callback: HostCallback) {
        CompiledModule::register_callback(self, slot, callback);
    }
}
