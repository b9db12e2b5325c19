//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result, bail};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 5000).
    pub port: u16,

    /// PostgreSQL connection URL. When None, collections live in memory.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Deployment environment (default: "development").
    pub app_env: String,

    /// Global ceiling for every entity's page size (default: 100).
    pub query_max_limit: u32,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = var("PORT")
            .unwrap_or_else(|| "5000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url = var("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let database_max_connections = var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let app_env = var("APP_ENV")
            .unwrap_or_else(|| "development".to_string())
            .to_lowercase();

        let query_max_limit: u32 = var("QUERY_MAX_LIMIT")
            .unwrap_or_else(|| "100".to_string())
            .parse()
            .context("QUERY_MAX_LIMIT must be a valid u32")?;
        if query_max_limit == 0 {
            bail!("QUERY_MAX_LIMIT must be at least 1");
        }

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|| vec!["*".to_string()]);

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            app_env,
            query_max_limit,
            cors_allowed_origins,
        })
    }

    /// Production hides error traces from responses.
    pub fn is_production(&self) -> bool {
        matches!(self.app_env.as_str(), "production" | "prod")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            database_url: None,
            database_max_connections: 10,
            app_env: "development".to_string(),
            query_max_limit: 100,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 5000);
        assert!(config.database_url.is_none());
        assert_eq!(config.query_max_limit, 100);
        assert_eq!(config.cors_allowed_origins, vec!["*"]);
        assert!(!config.is_production());
    }

    #[test]
    fn production_and_origins() {
        let config = load(&[
            ("APP_ENV", "Production"),
            ("CORS_ALLOWED_ORIGINS", "https://a.io, https://b.io"),
            ("DATABASE_URL", "postgres://localhost/quarry"),
        ])
        .unwrap();
        assert!(config.is_production());
        assert_eq!(config.cors_allowed_origins, vec!["https://a.io", "https://b.io"]);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/quarry")
        );
    }

    #[test]
    fn invalid_numbers_fail() {
        assert!(load(&[("PORT", "http")]).is_err());
        assert!(load(&[("QUERY_MAX_LIMIT", "0")]).is_err());
        assert!(load(&[("DATABASE_MAX_CONNECTIONS", "-1")]).is_err());
    }
}
