//! Built-in defaults (layer 1)

use super::{DbConfig, HkpConfig, OpenPgpConfig, Settings};

pub const DEFAULT_HKP_BIND: &str = ":11371";

pub const DEFAULT_DB_DRIVER: &str = "postgres";

pub const DEFAULT_DB_DSN: &str = "dbname=hkp host=/var/run/postgresql sslmode=disable";

/// Hours between statistics refreshes
pub const DEFAULT_STATS_REFRESH_HOURS: u32 = 4;

pub const DEFAULT_NWORKERS: u32 = 8;

pub const DEFAULT_LOG_LEVEL: &str = "INFO";

impl Default for HkpConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_HKP_BIND.to_string(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            driver: DEFAULT_DB_DRIVER.to_string(),
            dsn: DEFAULT_DB_DSN.to_string(),
        }
    }
}

impl Default for OpenPgpConfig {
    fn default() -> Self {
        Self {
            verify_sigs: false,
            stats_refresh_hours: DEFAULT_STATS_REFRESH_HOURS,
            nworkers: DEFAULT_NWORKERS,
            db: DbConfig::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hkp: HkpConfig::default(),
            hkps: None,
            openpgp: OpenPgpConfig::default(),
            logfile: None,
            loglevel: DEFAULT_LOG_LEVEL.to_string(),
            webroot: None,
        }
    }
}
