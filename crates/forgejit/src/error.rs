//! Error types for compiled modules

use forgejit_config::ConfigError;
use forgejit_core::DefinitionError;
use thiserror::Error;

/// Main error type for compiled module operations.
///
/// Every variant except [`ModuleError::Invocation`] is fatal for the operation
/// that produced it: the module never retries.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// `init` was given no function definitions
    #[error("cannot build a module from zero function definitions")]
    EmptyUnit,

    /// `init` was called twice
    #[error("module is already initialized")]
    AlreadyInitialized,

    /// An operation needing the unit ran before `init`
    #[error("module is not initialized")]
    NotInitialized,

    /// A function definition cannot be lowered
    #[error("invalid function definition: {0}")]
    Definition(#[from] DefinitionError),

    /// The target specification could not be resolved
    #[error("target error: {0}")]
    Target(String),

    /// The ISA the JIT selected lays out data differently from the unit
    #[error("Data layout mismatch between module({module}) and ExecutionEngine ({engine})")]
    DataLayoutMismatch { module: String, engine: String },

    /// The JIT engine could not be created
    #[error("Failed to initialize JIT engine for {triple}: {reason}")]
    EngineBuild { triple: String, reason: String },

    /// A previous engine construction failed; the unit is gone
    #[error("JIT engine unavailable, construction failed earlier: {0}")]
    EngineFailed(String),

    /// An initializer returned a non-zero status
    #[error("initializer {name} returned status {status}: {message}")]
    Initializer {
        name: String,
        status: i32,
        message: String,
    },

    /// A symbol required to exist was not generated
    #[error("Failed to Precompile function {0}")]
    SymbolNotFound(String),

    /// No emitter for the requested format
    #[error("Do not know how to save file {path} with format='{format}'")]
    UnknownFormat { path: String, format: String },

    /// The destination file could not be opened
    #[error("Cannot open file: {path} {source}")]
    FileOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing to an opened destination failed
    #[error("Cannot write file: {path} {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend could not emit the requested artifact
    #[error("Cannot emit target {kind}: {reason}")]
    Emit { kind: &'static str, reason: String },

    /// Lowering a definition to backend IR failed
    #[error("codegen error in {function}: {reason}")]
    Codegen { function: String, reason: String },

    /// A generated function returned a non-zero status
    #[error("function returned status {status}: {message}")]
    Invocation { status: i32, message: String },

    /// The operation is not supported by this module kind
    #[error("{0}")]
    Unsupported(&'static str),

    /// A bitcode stream is malformed
    #[error("bitcode error: {0}")]
    Bitcode(String),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for compiled module operations
pub type Result<T> = std::result::Result<T, ModuleError>;
