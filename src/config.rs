//! Configuration for codecs and version detection
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (lineage.toml)
//! - Environment variables (LINEAGE__*)
//!
//! ## Example config file (lineage.toml):
//! ```toml
//! [codec]
//! version_field = "metadata.schemaVersion"
//! pretty = false
//!
//! [detection]
//! tie_break = "strict"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::codec::{FieldPath, JsonCodec};
use crate::detect::TieBreak;
use crate::error::Result;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineageConfig {
    /// Wire codec settings
    #[serde(default)]
    pub codec: CodecConfig,

    /// Version detection settings
    #[serde(default)]
    pub detection: DetectionConfig,
}

/// Codec configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Dotted path of the version tag inside payloads; untagged if unset
    #[serde(default = "default_version_field")]
    pub version_field: Option<String>,

    /// Emit indented JSON
    #[serde(default)]
    pub pretty: bool,
}

/// Detection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// What to do with untagged payloads matching several versions
    #[serde(default)]
    pub tie_break: TieBreak,
}

fn default_version_field() -> Option<String> {
    Some("schemaVersion".to_string())
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            version_field: default_version_field(),
            pretty: false,
        }
    }
}

impl LineageConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["lineage.toml", ".lineage.toml", "config/lineage.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "lineage") {
            let xdg_config = config_dir.config_dir().join("lineage.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("LINEAGE")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// JSON codec named `name` with the configured tag and formatting
    pub fn json_codec(&self, name: &str) -> Result<JsonCodec> {
        let mut codec = JsonCodec::new(name).pretty(self.codec.pretty);
        if let Some(path) = &self.codec.version_field {
            codec = codec.with_version_field(FieldPath::parse(path)?);
        }
        Ok(codec)
    }
}
