//! Process settings loaded via OrthoConfig.
//!
//! Values come from `--db-file-name`-style flags, `POSTBOARD_*` environment
//! variables or a configuration file, in OrthoConfig's usual precedence.

use std::net::{Ipv4Addr, SocketAddr};

use ortho_config::OrthoConfig;
use serde::Deserialize;

/// Default listener port.
pub const DEFAULT_PORT: u16 = 3000;

/// Errors raised while turning loaded settings into a runnable configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// No database file was configured.
    #[error("database file location is required; set POSTBOARD_DB_FILE_NAME or --db-file-name")]
    MissingDatabaseFile,
}

/// Settings controlling storage and the HTTP listener.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "POSTBOARD")]
pub struct AppSettings {
    /// Path to the SQLite database file.
    pub db_file_name: Option<String>,
    /// Port the HTTP listener binds to.
    #[ortho_config(default = 3000)]
    pub port: u16,
    /// Maximum number of pooled database connections.
    #[ortho_config(default = 4)]
    pub pool_max_size: u32,
}

impl AppSettings {
    /// Return the configured database file.
    ///
    /// # Errors
    /// Returns [`SettingsError::MissingDatabaseFile`] when no location is set
    /// or the configured value is blank.
    pub fn database_file(&self) -> Result<&str, SettingsError> {
        self.db_file_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or(SettingsError::MissingDatabaseFile)
    }

    /// Address the listener binds to on all interfaces.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}
