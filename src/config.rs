//! Connection configuration loading and validation.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DriverError, Result};

/// Supported connection kinds. The kind selects which backend and SQL
/// dialect implementation the driver instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    /// MySQL 5.7.9+ or MariaDB 10.2.6+
    Mysql,
    /// PostgreSQL 9.5+
    #[serde(alias = "pgsql")]
    Postgres,
}

impl DbKind {
    /// Get the kind identifier (e.g. "mysql", "postgres").
    pub fn as_str(&self) -> &'static str {
        match self {
            DbKind::Mysql => "mysql",
            DbKind::Postgres => "postgres",
        }
    }

    /// Default TCP port for the server kind.
    pub fn default_port(&self) -> u16 {
        match self {
            DbKind::Mysql => 3306,
            DbKind::Postgres => 5432,
        }
    }

    /// Default client character set for the server kind.
    pub fn default_charset(&self) -> &'static str {
        match self {
            DbKind::Mysql => "utf8mb4",
            DbKind::Postgres => "UTF8",
        }
    }
}

/// Connection options for a single document-store driver.
///
/// Besides the structured fields, `driver_options` is a free-form map of
/// low-level tuning flags. Keys understood by the selected backend are
/// applied (e.g. `stmt_cache_size` for MySQL, `application_name` and
/// `connect_timeout` for PostgreSQL); anything else is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Connection kind selector.
    pub connection: DbKind,

    /// Database host (default: "localhost").
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port. Defaults to the kind's well-known port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    pub dbname: String,

    /// Client character set. Defaults per kind (utf8mb4 / UTF8).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,

    /// Username.
    pub username: String,

    /// Password. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Free-form low-level connection tuning flags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub driver_options: BTreeMap<String, Value>,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl ConnectionOptions {
    /// Load connection options from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse connection options from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let options: ConnectionOptions = serde_yaml::from_str(yaml)?;
        options.validate()?;
        Ok(options)
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.dbname.is_empty() {
            return Err(DriverError::config("dbname must not be empty"));
        }
        if self.username.is_empty() {
            return Err(DriverError::config("username must not be empty"));
        }
        if self.port == Some(0) {
            return Err(DriverError::config("port must not be 0"));
        }
        if matches!(&self.charset, Some(cs) if cs.is_empty()) {
            return Err(DriverError::config("charset must not be empty"));
        }
        Ok(())
    }

    /// Effective port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.connection.default_port())
    }

    /// Effective character set.
    pub fn charset(&self) -> &str {
        self.charset
            .as_deref()
            .unwrap_or_else(|| self.connection.default_charset())
    }

    /// Look up a string-valued driver option.
    pub fn driver_option_str(&self, key: &str) -> Option<&str> {
        self.driver_options.get(key).and_then(Value::as_str)
    }

    /// Look up an integer-valued driver option.
    pub fn driver_option_u64(&self, key: &str) -> Option<u64> {
        self.driver_options.get(key).and_then(Value::as_u64)
    }
}
