//! Settings types, loading and validation

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::merge::merge_layers;
use crate::resolve::MergeContext;

/// Top-level table holding the settings in a file
pub const SETTINGS_TABLE: &str = "hockeypuck";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HkpConfig {
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HkpsConfig {
    pub bind: String,
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub driver: String,
    pub dsn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPgpConfig {
    /// Let signature verification decide which signatures count
    #[serde(rename = "verifySigs")]
    pub verify_sigs: bool,

    #[serde(rename = "statsRefresh")]
    pub stats_refresh_hours: u32,

    /// Worker pool size of the surrounding service
    pub nworkers: u32,

    pub db: DbConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hkp: HkpConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hkps: Option<HkpsConfig>,

    pub openpgp: OpenPgpConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logfile: Option<PathBuf>,

    pub loglevel: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub webroot: Option<PathBuf>,
}

impl Settings {
    /// Parse settings text over the built-in defaults.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let table = settings_table(text)?;
        Self::from_layers(vec![builtin_value()?, table])
    }

    /// Read and parse a settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        EffectiveSettings::build(Some(path), None).map(|e| e.settings)
    }

    fn from_layers(layers: Vec<toml::Value>) -> Result<Self, ConfigError> {
        let settings: Settings = merge_layers(layers).try_into()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.openpgp.nworkers == 0 {
            return Err(ConfigError::Invalid {
                field: "openpgp.nworkers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.openpgp.stats_refresh_hours == 0 {
            return Err(ConfigError::Invalid {
                field: "openpgp.statsRefresh",
                reason: "must be at least 1 hour".to_string(),
            });
        }
        self.log_level()?;
        if let Some(hkps) = &self.hkps {
            if hkps.cert.as_os_str().is_empty() || hkps.key.as_os_str().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "hkps",
                    reason: "cert and key are both required".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Parsed `loglevel`, matched case-insensitively.
    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(&self.loglevel).map_err(|_| ConfigError::Invalid {
            field: "loglevel",
            reason: format!("unknown level '{}'", self.loglevel),
        })
    }

    /// Merge inputs derived from these settings.
    pub fn merge_context(&self) -> MergeContext<'static> {
        MergeContext::new().verify_sigs(self.openpgp.verify_sigs)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let mut doc = toml::Table::new();
        doc.insert(SETTINGS_TABLE.to_string(), toml::Value::try_from(self)?);
        Ok(toml::to_string_pretty(&doc)?)
    }
}

fn builtin_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Settings::default())?)
}

/// The `[hockeypuck]` table of a settings document, empty if absent.
fn settings_table(text: &str) -> Result<toml::Value, ConfigError> {
    let mut doc: toml::Table = toml::from_str(text)?;
    Ok(doc
        .remove(SETTINGS_TABLE)
        .unwrap_or_else(|| toml::Value::Table(toml::Table::new())))
}

/// Origin of a settings layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// SHA-256 of the raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged settings plus the layers they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveSettings {
    pub settings: Settings,
    pub sources: Vec<ConfigSource>,
}

impl EffectiveSettings {
    /// Merge defaults, an optional file and optional CLI overrides.
    ///
    /// CLI overrides use the same shape as the `[hockeypuck]` table.
    pub fn build(file: Option<&Path>, cli: Option<toml::Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![builtin_value()?];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = file {
            let bytes = fs::read(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let digest = hex::encode(Sha256::digest(&bytes));
            let text = String::from_utf8(bytes).map_err(|e| ConfigError::Invalid {
                field: "file",
                reason: format!("not UTF-8: {}", e),
            })?;
            layers.push(settings_table(&text)?);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_path_buf()),
                digest: Some(digest),
            });
        }

        if let Some(overrides) = cli {
            layers.push(overrides);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let settings = Settings::from_layers(layers)?;
        debug!(layers = sources.len(), "settings loaded");
        Ok(Self { settings, sources })
    }
}
