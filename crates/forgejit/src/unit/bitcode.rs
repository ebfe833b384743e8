//! Portable bitcode: the target-independent definitions of a unit.
//!
//! Layout: `BITCODE_MAGIC`, little-endian `u32` version, then a bincode body.

use forgejit_core::FunctionDef;
use serde::{Deserialize, Serialize};

use super::UnitView;
use crate::error::{ModuleError, Result};
use crate::target::DataLayout;

pub const BITCODE_MAGIC: &[u8; 4] = b"FJBC";
pub const BITCODE_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

#[derive(Serialize)]
struct BitcodeRef<'a> {
    name: &'a str,
    target_spec: &'a str,
    target_triple: &'a str,
    data_layout: &'a DataLayout,
    functions: &'a [FunctionDef],
}

/// A decoded bitcode stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Bitcode {
    pub name: String,
    pub target_spec: String,
    pub target_triple: String,
    pub data_layout: DataLayout,
    pub functions: Vec<FunctionDef>,
}

/// Serializes a unit's definitions.
pub fn encode_bitcode(view: &UnitView) -> Result<Vec<u8>> {
    let body = BitcodeRef {
        name: view.name(),
        target_spec: view.target_spec(),
        target_triple: view.target_triple(),
        data_layout: view.data_layout(),
        functions: view.definitions(),
    };
    let payload = bincode::serialize(&body).map_err(|e| ModuleError::Bitcode(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(BITCODE_MAGIC);
    out.extend_from_slice(&BITCODE_VERSION.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Reads back a stream written by [`encode_bitcode`].
pub fn decode_bitcode(bytes: &[u8]) -> Result<Bitcode> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != BITCODE_MAGIC {
        return Err(ModuleError::Bitcode("missing bitcode magic".to_string()));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    if version != BITCODE_VERSION {
        return Err(ModuleError::Bitcode(format!(
            "unsupported bitcode version {version}, expected {BITCODE_VERSION}"
        )));
    }
    bincode::deserialize(&bytes[HEADER_LEN..]).map_err(|e| ModuleError::Bitcode(e.to_string()))
}
