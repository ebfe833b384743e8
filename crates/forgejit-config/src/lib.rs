//! Configuration system for forgejit.
//!
//! Load backend configuration from TOML or YAML files to control the JIT
//! optimization level, IR verification and object emission without code changes.
//!
//! # Examples
//!
//! Load configuration from TOML string:
//!
//! ```
//! use forgejit_config::{ForgeConfig, OptLevel};
//!
//! let config = ForgeConfig::from_toml_str(r#"
//!     [jit]
//!     opt_level = "speed"
//!
//!     [object]
//!     is_pic = false
//!     object_name = "kernels"
//! "#).unwrap();
//!
//! assert_eq!(config.jit.opt_level, OptLevel::Speed);
//! assert!(!config.object.is_pic);
//! ```
//!
//! Use default config when file is missing:
//!
//! ```
//! use forgejit_config::ForgeConfig;
//!
//! let config = ForgeConfig::load("forgejit.toml").unwrap_or_default();
//! // Proceeds with defaults if file doesn't exist
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;


/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main backend configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ForgeConfig {
    /// Just-in-time engine configuration.
    #[serde(default)]
    pub jit: JitConfig,

    /// Native object emission configuration.
    #[serde(default)]
    pub object: ObjectConfig,

    /// Code generation configuration.
    #[serde(default)]
    pub codegen: CodegenConfig,
}

impl ForgeConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if file doesn't exist or contains invalid TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_file(path)
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the JIT optimization level.
    pub fn with_jit_opt_level(mut self, level: OptLevel) -> Self {
        self.jit.opt_level = level;
        self
    }

    /// Sets whether emitted objects are position independent.
    pub fn with_pic(mut self, is_pic: bool) -> Self {
        self.object.is_pic = is_pic;
        self
    }

    /// Sets the name recorded inside emitted object files.
    pub fn with_object_name(mut self, name: impl Into<String>) -> Self {
        self.object.object_name = Some(name.into());
        self
    }

    /// Enables or disables the IR verifier for both code generation and JIT.
    pub fn with_verifier(mut self, enabled: bool) -> Self {
        self.jit.enable_verifier = enabled;
        self.codegen.verify = enabled;
        self
    }

    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.object.object_name {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "object.object_name must not be blank".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Backend optimization level.
///
/// Names match the values of Cranelift's `opt_level` setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    /// No optimization.
    None,

    /// Optimize for speed.
    Speed,

    /// Optimize for speed and size; the most aggressive level available.
    #[default]
    SpeedAndSize,
}

impl OptLevel {
    /// Returns the backend setting value for this level.
    pub fn as_setting(&self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

impl std::str::FromStr for OptLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "0" => Ok(OptLevel::None),
            "speed" | "2" => Ok(OptLevel::Speed),
            "speed_and_size" | "3" => Ok(OptLevel::SpeedAndSize),
            other => Err(ConfigError::Invalid(format!("unknown opt level '{other}'"))),
        }
    }
}

/// Just-in-time engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "snake_case")]
pub struct JitConfig {
    /// Optimization level used when the engine is built.
    pub opt_level: OptLevel,

    /// Whether the backend verifies IR before compiling.
    pub enable_verifier: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::SpeedAndSize,
            enable_verifier: true,
        }
    }
}

/// Native object emission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ObjectConfig {
    /// Emit position independent code.
    pub is_pic: bool,

    /// Name recorded in the object file. Defaults to the unit name.
    pub object_name: Option<String>,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            is_pic: true,
            object_name: None,
        }
    }
}

/// Code generation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CodegenConfig {
    /// Run the IR verifier on every generated function.
    pub verify: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self { verify: true }
    }
}
