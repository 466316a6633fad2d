use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::db::ConnectionConfig;

/// Settings read from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: ConnectionConfig,
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("catalogsql")
            .join("config.toml")
    }

    /// Load from `path`, or from the default location when none is given.
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error. An empty password is taken from `PGPASSWORD`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::read(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_password(std::env::var("PGPASSWORD").ok());
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_password(&mut self, env_password: Option<String>) {
        if self.database.password.is_empty() {
            if let Some(password) = env_password {
                self.database.password = password;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SslMode;

    #[test]
    fn test_parse_database_section() {
        let config = Config::from_toml(
            r#"
            [database]
            host = "db.internal"
            port = 6432
            database = "accounting"
            username = "reader"
            ssl_mode = "VerifyFull"
            ca_cert_path = "/etc/ssl/db.pem"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6432);
        assert_eq!(config.database.ssl_mode, SslMode::VerifyFull);
        assert_eq!(config.database.ca_cert_path.as_deref(), Some("/etc/ssl/db.pem"));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 5432);
    }

    #[test]
    fn test_password_falls_back_to_environment() {
        let mut config = Config::default();
        config.apply_password(Some("secret".into()));
        assert_eq!(config.database.password, "secret");

        let mut config = Config::from_toml("[database]\npassword = \"file\"").unwrap();
        config.apply_password(Some("secret".into()));
        assert_eq!(config.database.password, "file");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/catalogsql.toml"))).is_err());
    }

    #[test]
    fn test_default_path_ends_with_app_dir() {
        assert!(Config::default_path().ends_with("catalogsql/config.toml"));
    }
}
