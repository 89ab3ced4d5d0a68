//! Configuration management for the generator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (protogen.toml)
//! - Environment variables (PROTOGEN__*)
//!
//! ## Example config file (protogen.toml):
//! ```toml
//! [output]
//! header_suffix = ".h"
//! impl_suffix = ".c"
//!
//! [codegen]
//! location_type = "YYLTYPE"
//! padding_type = "long"
//!
//! [resolve]
//! void_constant = "reject"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::model::is_integer_type;

/// Main configuration for the generator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Output naming
    #[serde(default)]
    pub output: OutputConfig,

    /// Code generation settings
    #[serde(default)]
    pub codegen: CodegenConfig,

    /// Dispatch resolution settings
    #[serde(default)]
    pub resolve: ResolveConfig,
}

/// Output file naming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Replaces the input extension to derive the header path
    #[serde(default = "default_header_suffix")]
    pub header_suffix: String,

    /// Replaces the input extension to derive the implementation path
    #[serde(default = "default_impl_suffix")]
    pub impl_suffix: String,
}

/// Code generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodegenConfig {
    /// Type of the per-instance source location tag
    #[serde(default = "default_location_type")]
    pub location_type: String,

    /// Integer type of the zero-width bit-field heading each element
    #[serde(default = "default_padding_type")]
    pub padding_type: String,

    /// Tool named in the do-not-edit banner
    #[serde(default = "default_tool_name")]
    pub tool_name: String,

    /// Prefix of the header include guard
    #[serde(default = "default_guard_prefix")]
    pub guard_prefix: String,
}

/// Dispatch resolution settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// What to do with `returns 0/1/this` on a void method
    #[serde(default)]
    pub void_constant: VoidConstantPolicy,
}

/// Handling of constant-returning kinds on void methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoidConstantPolicy {
    /// Fail resolution
    #[default]
    Reject,
    /// Generate an empty body instead
    Coerce,
}

// Default value functions
fn default_header_suffix() -> String {
    ".h".to_string()
}

fn default_impl_suffix() -> String {
    ".c".to_string()
}

fn default_location_type() -> String {
    "YYLTYPE".to_string()
}

fn default_padding_type() -> String {
    "long".to_string()
}

fn default_tool_name() -> String {
    "protogen".to_string()
}

fn default_guard_prefix() -> String {
    "PROTOGEN".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            header_suffix: default_header_suffix(),
            impl_suffix: default_impl_suffix(),
        }
    }
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            location_type: default_location_type(),
            padding_type: default_padding_type(),
            tool_name: default_tool_name(),
            guard_prefix: default_guard_prefix(),
        }
    }
}

impl CodegenConfig {
    /// Reject settings that cannot produce valid C
    pub fn validate(&self) -> crate::error::Result<()> {
        if is_integer_type(&self.padding_type) {
            Ok(())
        } else {
            Err(crate::error::Error::Usage(format!(
                "padding_type `{}` is not an integer type",
                self.padding_type
            )))
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["protogen.toml", ".protogen.toml", "config/protogen.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(dirs) = directories::ProjectDirs::from("dev", "protogen", "protogen") {
            let xdg_config = dirs.config_dir().join("protogen.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // PROTOGEN__CODEGEN__LOCATION_TYPE=loc_t
        builder = builder.add_source(
            Environment::with_prefix("PROTOGEN")
                .prefix_separator("__")
                .separator("__"),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config
            .codegen
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
