//! Process-wide table of module builders.
//!
//! Host runtimes look builders up by name instead of linking against a
//! concrete module type. [`BUILD_CRANELIFT`] is registered on first access.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use forgejit_core::FunctionDef;
use tracing::debug;

use crate::error::Result;
use crate::module::{CompiledModule, Module};

/// Name of the builder producing Cranelift compiled modules.
pub const BUILD_CRANELIFT: &str = "codegen.build_cranelift";

/// Builds a module from function definitions and a target specification.
pub type BuildFn = fn(&[FunctionDef], &str) -> Result<Module>;

/// Builds a Cranelift compiled module and returns it as an opaque handle.
pub fn build_cranelift(defs: &[FunctionDef], target: &str) -> Result<Module> {
    let module: Arc<CompiledModule> = CompiledModule::build(defs, target)?;
    Ok(Module::new(module))
}

/// Named builders.
pub struct Registry {
    builders: RwLock<HashMap<String, BuildFn>>,
}

impl Registry {
    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let registry = Registry {
                builders: RwLock::new(HashMap::new()),
            };
            registry.register(BUILD_CRANELIFT, build_cranelift);
            registry
        })
    }

    /// Registers `builder` under `name`, replacing any previous entry.
    pub fn register(&self, name: &str, builder: BuildFn) {
        debug!(event = "builder_registered", name = %name);
        self.builders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), builder);
    }

    pub fn get(&self, name: &str) -> Option<BuildFn> {
        self.builders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .builders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cranelift_builder_registered() {
        let registry = Registry::global();
        assert!(registry.names().contains(&BUILD_CRANELIFT.to_string()));
        assert!(registry.get(BUILD_CRANELIFT).is_some());
        assert!(registry.get("codegen.build_llvm").is_none());
    }

    #[test]
    fn test_builder_rejects_empty_unit() {
        let build = Registry::global().get(BUILD_CRANELIFT).unwrap();
        let err = build(&[], "native").unwrap_err();
        assert!(matches!(err, crate::error::ModuleError::EmptyUnit));
    }

    #[test]
    fn test_builder_returns_module_handle() {
        let defs = forgejit_test::fixtures::sum_into();
        let module = build_cranelift(&defs, "native").unwrap();
        assert_eq!(module.type_key(), "cranelift");
        assert!(module.get_function("sum_into").unwrap().is_some());
    }
}
