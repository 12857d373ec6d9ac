// Circulation Core - School Library Circulation Engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Library configuration
//!
//! Values are layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. A TOML file (`LibraryConfig::load`)
//! 3. Environment overrides (`LIBRARY_*`)
//!
//! # Example file
//! ```toml
//! default_due_days = 21
//! max_checkout_books = 3
//!
//! [database]
//! path = "/var/lib/library/circulation.db"
//! ```
//!
//! `default_due_days` and `max_checkout_books` only seed the persisted
//! library settings the first time a database is created. After that the
//! settings row is authoritative and is edited through the service.

use crate::error::{CirculationError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DUE_DAYS: u32 = 14;
pub const DEFAULT_MAX_CHECKOUT_BOOKS: u32 = 5;
pub const DEFAULT_CHECKOUT_RETRY_ATTEMPTS: u32 = 3;

/// Longest loan period accepted, one school year
pub const MAX_DUE_DAYS: u32 = 365;
/// Highest per-student checkout cap accepted
pub const MAX_CHECKOUT_BOOKS: u32 = 100;

pub const ENV_DEFAULT_DUE_DAYS: &str = "LIBRARY_DEFAULT_DUE_DAYS";
pub const ENV_MAX_CHECKOUT_BOOKS: &str = "LIBRARY_MAX_CHECKOUT_BOOKS";
pub const ENV_DATABASE_PATH: &str = "LIBRARY_DATABASE_PATH";
pub const ENV_LOG: &str = "LIBRARY_LOG";

/// SQLite connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file, created if missing
    pub path: PathBuf,
    /// Connection pool size
    pub max_connections: u32,
    /// How long a writer waits on a locked database
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("circulation.db"),
            max_connections: 5,
            busy_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

/// Library-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Loan period in days
    pub default_due_days: u32,
    /// Per-student cap on concurrently open checkouts
    pub max_checkout_books: u32,
    /// Attempts at the optimistic copy claim before reporting a conflict
    pub checkout_retry_attempts: u32,
    pub database: DatabaseConfig,
    /// tracing-subscriber filter directive used by the CLI
    pub log_filter: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            default_due_days: DEFAULT_DUE_DAYS,
            max_checkout_books: DEFAULT_MAX_CHECKOUT_BOOKS,
            checkout_retry_attempts: DEFAULT_CHECKOUT_RETRY_ATTEMPTS,
            database: DatabaseConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl LibraryConfig {
    pub fn builder() -> LibraryConfigBuilder {
        LibraryConfigBuilder::new()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: LibraryConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CirculationError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut config: LibraryConfig = toml::from_str(&text)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LIBRARY_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_DEFAULT_DUE_DAYS) {
            self.default_due_days = parse_env_u32(ENV_DEFAULT_DUE_DAYS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CHECKOUT_BOOKS) {
            self.max_checkout_books = parse_env_u32(ENV_MAX_CHECKOUT_BOOKS, &value)?;
        }
        if let Some(value) = lookup(ENV_DATABASE_PATH) {
            self.database.path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_LOG) {
            self.log_filter = value;
        }
        Ok(())
    }

    /// Reject values the core cannot operate with
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_DUE_DAYS).contains(&self.default_due_days) {
            return Err(CirculationError::Configuration(format!(
                "default_due_days must be between 1 and {}",
                MAX_DUE_DAYS
            )));
        }
        if !(1..=MAX_CHECKOUT_BOOKS).contains(&self.max_checkout_books) {
            return Err(CirculationError::Configuration(format!(
                "max_checkout_books must be between 1 and {}",
                MAX_CHECKOUT_BOOKS
            )));
        }
        if self.checkout_retry_attempts == 0 {
            return Err(CirculationError::Configuration(
                "checkout_retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(CirculationError::Configuration(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env_u32(key: &str, value: &str) -> Result<u32> {
    value.trim().parse::<u32>().map_err(|e| {
        CirculationError::Configuration(format!("{} must be a whole number: {}", key, e))
    })
}

/// Builder for LibraryConfig
#[derive(Debug)]
pub struct LibraryConfigBuilder {
    config: LibraryConfig,
}

impl LibraryConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LibraryConfig::default(),
        }
    }

    pub fn default_due_days(mut self, days: u32) -> Self {
        self.config.default_due_days = days;
        self
    }

    pub fn max_checkout_books(mut self, max: u32) -> Self {
        self.config.max_checkout_books = max;
        self
    }

    pub fn checkout_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.checkout_retry_attempts = attempts;
        self
    }

    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.database.path = path.into();
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.config.database.max_connections = max;
        self
    }

    pub fn build(self) -> Result<LibraryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for LibraryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = LibraryConfig::default();
        assert_eq!(config.default_due_days, 14);
        assert_eq!(config.max_checkout_books, 5);
        assert_eq!(config.checkout_retry_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LibraryConfig::from_toml_str(
            r#"
            default_due_days = 21

            [database]
            path = "/tmp/library.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_due_days, 21);
        assert_eq!(config.max_checkout_books, 5);
        assert_eq!(config.database.path, PathBuf::from("/tmp/library.db"));
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_zero_loan_period_rejected() {
        let err = LibraryConfig::from_toml_str("default_due_days = 0").unwrap_err();
        assert!(matches!(err, CirculationError::Configuration(_)));
    }

    #[test]
    fn test_oversized_limits_rejected() {
        let err = LibraryConfig::from_toml_str("default_due_days = 100000000").unwrap_err();
        assert!(matches!(err, CirculationError::Configuration(_)));

        let err = LibraryConfig::from_toml_str("max_checkout_books = 5000").unwrap_err();
        assert!(matches!(err, CirculationError::Configuration(_)));

        assert!(LibraryConfig::builder().default_due_days(MAX_DUE_DAYS).build().is_ok());
    }

    #[test]
    fn test_malformed_toml() {
        let err = LibraryConfig::from_toml_str("default_due_days = \"soon\"").unwrap_err();
        assert!(matches!(err, CirculationError::Toml(_)));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_MAX_CHECKOUT_BOOKS, "2"),
            (ENV_DATABASE_PATH, "/srv/circ.db"),
        ]
        .into_iter()
        .collect();

        let mut config = LibraryConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.max_checkout_books, 2);
        assert_eq!(config.default_due_days, 14);
        assert_eq!(config.database.path, PathBuf::from("/srv/circ.db"));
    }

    #[test]
    fn test_bad_override() {
        let mut config = LibraryConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_DEFAULT_DUE_DAYS).then(|| "two weeks".to_string()))
            .unwrap_err();
        assert!(matches!(err, CirculationError::Configuration(_)));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.toml");
        std::fs::write(&path, "max_checkout_books = 3\n").unwrap();

        let config = LibraryConfig::load(&path).unwrap();
        assert_eq!(config.max_checkout_books, 3);
    }

    #[test]
    fn test_builder() {
        let config = LibraryConfig::builder()
            .default_due_days(7)
            .max_checkout_books(1)
            .build()
            .unwrap();
        assert_eq!(config.default_due_days, 7);
        assert_eq!(config.max_checkout_books, 1);

        assert!(LibraryConfig::builder().checkout_retry_attempts(0).build().is_err());
    }
}
