//! Lowering of function definitions into a code unit.
//!
//! Each definition becomes one Cranelift function with the packed signature.
//! The generated prologue validates `num_args` and every type code and reports
//! mismatches through the host arg-error hook; the body then runs on `i64`
//! values.
//!
//! # Function Layout
//!
//! ```text
//! entry:     num_args == N ?            else -> arg_error(count)
//! check_i:   type_codes[i] == tag_i ?   else -> arg_error(type code, i)
//! body:      load slots, run statements, return 0
//! ```

#[cfg(test)]
mod tests;

mod compiler;

use cranelift_codegen::verify_function;
use forgejit_config::CodegenConfig;
use forgejit_core::{validate_all, FunctionDef};
use tracing::debug;

use crate::error::{ModuleError, Result};
use crate::target::TargetDescriptor;
use crate::unit::{CodeUnit, UnitContext, FIRST_FUNCTION_INDEX};

/// Builds a code unit from `defs` for `target`.
///
/// The first definition is the entry function and names the unit.
pub fn generate(
    defs: &[FunctionDef],
    target: &TargetDescriptor,
    config: &CodegenConfig,
) -> Result<CodeUnit> {
    if defs.is_empty() {
        return Err(ModuleError::EmptyUnit);
    }
    validate_all(defs)?;

    let context = UnitContext::new(defs, target.call_conv(), target.pointer_type());
    let mut functions = Vec::with_capacity(defs.len());
    for (i, def) in defs.iter().enumerate() {
        let index = (FIRST_FUNCTION_INDEX + i) as u32;
        let func = compiler::lower(def, index, &context, target.pointer_type())?;
        if config.verify {
            verify_function(&func, target.isa().flags()).map_err(|e| ModuleError::Codegen {
                function: def.name.clone(),
                reason: e.to_string(),
            })?;
        }
        debug!(
            event = "function_lowered",
            function = %def.name,
            params = def.params.len(),
            stmts = def.body.len()
        );
        functions.push(func);
    }

    Ok(CodeUnit::new(
        target.spec(),
        target.triple(),
        target.data_layout(),
        context,
        defs.to_vec(),
        functions,
    ))
}
