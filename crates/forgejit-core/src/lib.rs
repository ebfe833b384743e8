//! forgejit Core - Core types shared by the compiled-module crates
//!
//! This crate provides the target-independent description of a code unit:
//! - Function definitions with typed packed parameters
//! - Statement and expression trees lowered by the code generator
//! - Type codes of the packed calling convention

pub mod error;
pub mod expr;
pub mod function;
pub mod type_code;


pub use error::DefinitionError;
pub use expr::Expr;
pub use function::{validate_all, ArgKind, FunctionDef, FunctionRole, Stmt, RESERVED_PREFIX};
pub use type_code::TypeCode;
