//! The host-facing module interface.

use std::io::Write;
use std::sync::Arc;

use crate::bridge::PackedFunc;
use crate::error::Result;
use crate::runtime::{DeviceContext, HostCallback};

/// Operations every runtime module supports.
///
/// Object safe, so host runtimes can hold any module kind behind [`Module`].
pub trait ModuleNode: Send + Sync {
    /// Short name of the module kind.
    fn type_key(&self) -> &'static str;

    /// Resolves `name` so that a later lookup is cheap. Fails if the module
    /// has no such function.
    fn pre_compile(&self, name: &str, device: DeviceContext) -> Result<()>;

    /// Returns a handle to `name`, or `None` if the module does not export it.
    fn get_function(self: Arc<Self>, name: &str) -> Result<Option<PackedFunc>>;

    fn save_to_file(&self, path: &str, format: &str) -> Result<()>;

    fn get_source(&self, format: &str) -> Result<String>;

    fn save_to_binary(&self, stream: &mut dyn Write) -> Result<()>;

    /// Makes `callback` reachable from generated code under `slot`.
    ///
    /// Module kinds without host callbacks ignore the registration.
    fn register_callback(&self, slot: u32, callback: HostCallback) {
        let _ = (slot, callback);
    }
}

/// An opaque, cloneable handle to a runtime module.
#[derive(Clone)]
pub struct Module {
    node: Arc<dyn ModuleNode>,
}

impl Module {
    pub fn new(node: Arc<dyn ModuleNode>) -> Self {
        Self { node }
    }

    pub fn type_key(&self) -> &'static str {
        self.node.type_key()
    }

    pub fn pre_compile(&self, name: &str, device: DeviceContext) -> Result<()> {
        self.node.pre_compile(name, device)
    }

    pub fn get_function(&self, name: &str) -> Result<Option<PackedFunc>> {
        Arc::clone(&self.node).get_function(name)
    }

    pub fn save_to_file(&self, path: &str, format: &str) -> Result<()> {
        self.node.save_to_file(path, format)
    }

    pub fn get_source(&self, format: &str) -> Result<String> {
        self.node.get_source(format)
    }

    pub fn save_to_binary(&self, stream: &mut dyn Write) -> Result<()> {
        self.node.save_to_binary(stream)
    }

    /// Registers a host callback. Chainable.
    pub fn register_callback(
        &self,
        slot: u32,
        callback: impl Fn(i64) -> i64 + Send + Sync + 'static,
    ) -> &Self {
        self.node.register_callback(slot, Arc::new(callback));
        self
    }

    pub fn node(&self) -> &Arc<dyn ModuleNode> {
        &self.node
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("type_key", &self.type_key())
            .finish()
    }
}
