//! Type codes of the packed calling convention.

use serde::{Deserialize, Serialize};

/// Small integer tag describing how a value slot must be read.
///
/// The numeric values are part of the ABI: generated code compares the raw
/// `i32` tags passed by the caller against these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[repr(i32)]
pub enum TypeCode {
    Int = 0,
    UInt = 1,
    Float = 2,
    Handle = 3,
}

impl TypeCode {
    /// Returns the raw tag value.
    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Decodes a raw tag, if it is known.
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(TypeCode::Int),
            1 => Some(TypeCode::UInt),
            2 => Some(TypeCode::Float),
            3 => Some(TypeCode::Handle),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeCode::Int => "int",
            TypeCode::UInt => "uint",
            TypeCode::Float => "float",
            TypeCode::Handle => "handle",
        }
    }
}

impl std::fmt::Display for TypeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
