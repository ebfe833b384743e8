//! Writing a unit to disk.
//!
//! | format         | payload                                   |
//! |----------------|-------------------------------------------|
//! | `o`, `obj`     | relocatable object for the unit's target  |
//! | `ll`, `clif`   | textual IR of every function              |
//! | `bc`           | portable bitcode of the definitions       |
//!
//! Emission only reads the [`UnitView`], so it works before and after the
//! owning unit has moved into an engine, and never waits on one being built.

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::Write;

use cranelift_module::{default_libcall_names, ModuleError as BackendError};
use cranelift_object::{ObjectBuilder, ObjectModule};
use forgejit_config::ObjectConfig;
use tracing::info;

use crate::error::{ModuleError, Result};
use crate::format::file_format;
use crate::target::TargetDescriptor;
use crate::unit::{encode_bitcode, UnitView};

/// Saves the unit to `path`. See [`file_format`] for how `format` is resolved.
///
/// The payload is rendered before the file is opened, so an unknown format
/// leaves the filesystem untouched.
pub fn save_to_file(
    view: &UnitView,
    target: &TargetDescriptor,
    config: &ObjectConfig,
    path: &str,
    format: &str,
) -> Result<()> {
    let format = file_format(path, format);
    let bytes = match format.as_str() {
        "o" | "obj" => emit_object(view, target, config)?,
        "ll" | "clif" => view.text().into_bytes(),
        "bc" => encode_bitcode(view)?,
        _ => {
            return Err(ModuleError::UnknownFormat {
                path: path.to_string(),
                format,
            })
        }
    };

    {
        let mut file = File::create(path).map_err(|source| ModuleError::FileOpen {
            path: path.to_string(),
            source,
        })?;
        file.write_all(&bytes)
            .map_err(|source| ModuleError::FileWrite {
                path: path.to_string(),
                source,
            })?;
    }

    info!(
        event = "file_saved",
        unit = %view.name(),
        path = %path,
        format = %format,
        bytes = bytes.len()
    );
    Ok(())
}

/// Textual form of the unit. `""`, `ll` and `clif` all select it.
///
/// Every other format is rejected rather than ignored, so a caller asking for
/// assembly or bitcode text gets an error instead of IR it did not request.
pub fn source(view: &UnitView, format: &str) -> Result<String> {
    match format {
        "" | "ll" | "clif" => Ok(view.text()),
        other => Err(ModuleError::UnknownFormat {
            path: String::new(),
            format: other.to_string(),
        }),
    }
}

/// Compiles the unit for its own target into a relocatable object.
pub fn emit_object(
    view: &UnitView,
    target: &TargetDescriptor,
    config: &ObjectConfig,
) -> Result<Vec<u8>> {
    let emit_err = |e: BackendError| ModuleError::Emit {
        kind: "object",
        reason: e.to_string(),
    };
    let name = config.object_name.as_deref().unwrap_or(view.name());
    let builder =
        ObjectBuilder::new(target.isa().clone(), name, default_libcall_names()).map_err(emit_err)?;
    let mut module = ObjectModule::new(builder);
    view.context()
        .materialize(&mut module, view.functions().iter().cloned())
        .map_err(emit_err)?;

    module.finish().emit().map_err(|e| ModuleError::Emit {
        kind: "object",
        reason: e.to_string(),
    })
}
