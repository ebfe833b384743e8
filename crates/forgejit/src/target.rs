//! Target resolution and data layouts.
//!
//! A target specification string is resolved once, at `init` time, into a
//! [`TargetDescriptor`]. Accepted forms:
//!
//! - `""`, `"native"`, `"host"`: the machine running the process
//! - a bare triple, e.g. `"x86_64-unknown-linux-gnu"`
//! - `"cranelift -target=<triple> -opt=<level>"`, options in any order

use std::fmt;
use std::str::FromStr;

use cranelift_codegen::ir::{Endianness, Type};
use cranelift_codegen::isa::{self, CallConv, OwnedTargetIsa, TargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use forgejit_config::{ForgeConfig, JitConfig, OptLevel};
use serde::{Deserialize, Serialize};
use target_lexicon::Triple;

use crate::error::{ModuleError, Result};

/// The parts of an ISA that decide how generated code lays out data and
/// passes arguments.
///
/// Two units may only share code if their layouts are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct DataLayout {
    pub little_endian: bool,
    pub pointer_bits: u8,
    pub call_conv: String,
}

impl DataLayout {
    /// Derives the layout of an ISA.
    pub fn of(isa: &dyn TargetIsa) -> Self {
        Self {
            little_endian: isa.endianness() == Endianness::Little,
            pointer_bits: isa.pointer_bits(),
            call_conv: isa.default_call_conv().to_string(),
        }
    }
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endian = if self.little_endian { 'e' } else { 'E' };
        write!(
            f,
            "{endian}-p:{bits}:{bits}-cc:{cc}",
            bits = self.pointer_bits,
            cc = self.call_conv
        )
    }
}

/// The resolved machine a unit is generated for.
///
/// Immutable once built; cloning shares the underlying ISA.
#[derive(Clone)]
pub struct TargetDescriptor {
    spec: String,
    isa: OwnedTargetIsa,
}

impl TargetDescriptor {
    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn isa(&self) -> &OwnedTargetIsa {
        &self.isa
    }

    pub fn triple(&self) -> String {
        self.isa.triple().to_string()
    }

    pub fn data_layout(&self) -> DataLayout {
        DataLayout::of(&*self.isa)
    }

    pub fn pointer_type(&self) -> Type {
        self.isa.pointer_type()
    }

    pub fn call_conv(&self) -> CallConv {
        self.isa.default_call_conv()
    }
}

impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDescriptor")
            .field("spec", &self.spec)
            .field("triple", &self.triple())
            .finish()
    }
}

/// Resolves a target specification into a descriptor and its triple string.
pub fn resolve(spec: &str, config: &ForgeConfig) -> Result<(TargetDescriptor, String)> {
    let mut triple: Option<&str> = None;
    let mut opt_level = config.jit.opt_level;

    for token in spec.split_whitespace() {
        if let Some(value) = token.strip_prefix("-target=") {
            triple = Some(value);
        } else if let Some(value) = token.strip_prefix("-opt=") {
            opt_level = value.parse()?;
        } else if token.starts_with('-') {
            return Err(ModuleError::Target(format!(
                "unknown option '{token}' in target '{spec}'"
            )));
        } else if !matches!(token, "native" | "host" | "cranelift") {
            triple = Some(token);
        }
    }

    let builder = match triple {
        Some(name) => {
            let parsed = Triple::from_str(name)
                .map_err(|e| ModuleError::Target(format!("invalid triple '{name}': {e}")))?;
            isa::lookup(parsed)
                .map_err(|e| ModuleError::Target(format!("cannot find target '{name}': {e}")))?
        }
        None => cranelift_native::builder()
            .map_err(|e| ModuleError::Target(format!("host target unavailable: {e}")))?,
    };

    let flags = flags(opt_level, config.object.is_pic, config.codegen.verify)?;
    let isa = builder
        .finish(flags)
        .map_err(|e| ModuleError::Target(format!("cannot configure target '{spec}': {e}")))?;

    let descriptor = TargetDescriptor {
        spec: spec.to_string(),
        isa,
    };
    let triple = descriptor.triple();
    Ok((descriptor, triple))
}

/// Selects the host ISA the JIT engine compiles for.
pub(crate) fn host_isa(config: &JitConfig) -> std::result::Result<OwnedTargetIsa, String> {
    let builder = cranelift_native::builder().map_err(|e| format!("cranelift ISA builder: {e}"))?;
    let flags = flags(config.opt_level, false, config.enable_verifier).map_err(|e| e.to_string())?;
    builder
        .finish(flags)
        .map_err(|e| format!("cranelift ISA finish: {e}"))
}

fn flags(opt_level: OptLevel, is_pic: bool, verify: bool) -> Result<settings::Flags> {
    let mut flag_builder = settings::builder();
    let mut set = |name: &str, value: &str| {
        flag_builder
            .set(name, value)
            .map_err(|e| ModuleError::Target(format!("cranelift setting {name}={value}: {e}")))
    };
    set("opt_level", opt_level.as_setting())?;
    set("is_pic", if is_pic { "true" } else { "false" })?;
    set("enable_verifier", if verify { "true" } else { "false" })?;
    set("use_colocated_libcalls", "false")?;
    Ok(settings::Flags::new(flag_builder))
}
