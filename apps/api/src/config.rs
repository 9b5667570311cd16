use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Which session store backs the certification core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    /// Required when `store_backend` is Postgres.
    pub database_url: Option<String>,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub llm_timeout_secs: u64,
    pub agent_registry_path: Option<PathBuf>,
    pub default_passing_threshold: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let store_backend = match lookup("STORE_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => bail!("STORE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        };

        let database_url = match store_backend {
            StoreBackend::Postgres => Some(require("DATABASE_URL")?),
            StoreBackend::Memory => lookup("DATABASE_URL"),
        };

        let default_passing_threshold = lookup("DEFAULT_PASSING_THRESHOLD")
            .unwrap_or_else(|| "70".to_string())
            .parse::<u32>()
            .context("DEFAULT_PASSING_THRESHOLD must be a whole number")?;
        if default_passing_threshold > 100 {
            bail!("DEFAULT_PASSING_THRESHOLD must be between 0 and 100");
        }

        Ok(Config {
            store_backend,
            database_url,
            anthropic_api_key: require("ANTHROPIC_API_KEY")?,
            port: lookup("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            llm_timeout_secs: lookup("LLM_TIMEOUT_SECS")
                .unwrap_or_else(|| "120".to_string())
                .parse::<u64>()
                .context("LLM_TIMEOUT_SECS must be a number of seconds")?,
            agent_registry_path: lookup("AGENT_REGISTRY_PATH").map(PathBuf::from),
            default_passing_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_postgres() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/zyglio"),
            ("ANTHROPIC_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(config.store_backend, StoreBackend::Postgres);
        assert_eq!(config.port, 8080);
        assert_eq!(config.rust_log, "info");
        assert_eq!(config.llm_timeout_secs, 120);
        assert_eq!(config.default_passing_threshold, 70);
        assert!(config.agent_registry_path.is_none());
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = Config::from_lookup(lookup_from(&[("ANTHROPIC_API_KEY", "sk-test")]))
            .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_memory_backend_skips_database_url() {
        let config = Config::from_lookup(lookup_from(&[
            ("STORE_BACKEND", "Memory"),
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("AGENT_REGISTRY_PATH", "/etc/zyglio/agents.json"),
        ]))
        .unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.database_url.is_none());
        assert_eq!(
            config.agent_registry_path,
            Some(PathBuf::from("/etc/zyglio/agents.json"))
        );
    }

    #[test]
    fn test_rejects_unknown_backend_and_bad_threshold() {
        assert!(Config::from_lookup(lookup_from(&[
            ("STORE_BACKEND", "sqlite"),
            ("ANTHROPIC_API_KEY", "sk-test"),
        ]))
        .is_err());

        assert!(Config::from_lookup(lookup_from(&[
            ("STORE_BACKEND", "memory"),
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("DEFAULT_PASSING_THRESHOLD", "150"),
        ]))
        .is_err());
    }
}
