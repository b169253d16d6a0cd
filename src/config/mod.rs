//! Service settings
//!
//! Settings live under a `[hockeypuck]` table and are merged in layers:
//! 1. Built-in defaults
//! 2. Settings file
//! 3. CLI flags

mod defaults;
mod merge;
mod settings;

pub use defaults::{
    DEFAULT_DB_DRIVER, DEFAULT_DB_DSN, DEFAULT_HKP_BIND, DEFAULT_LOG_LEVEL, DEFAULT_NWORKERS,
    DEFAULT_STATS_REFRESH_HOURS,
};
pub use merge::{deep_merge, merge_layers};
pub use settings::{
    ConfigError, ConfigOrigin, ConfigSource, DbConfig, EffectiveSettings, HkpConfig, HkpsConfig,
    OpenPgpConfig, Settings, SETTINGS_TABLE,
};
