use crate::error::WharfError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Environment variable consulted for the worker count when the `--workers`
/// flag is absent.
pub const WORKERS_ENV: &str = "WHARFD_WORKERS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pool: PoolConfig,
    pub runtime: RuntimeConfig,
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// host:port the shared listening socket binds to.
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker processes. Fixed for the life of the pool.
    pub workers: usize,
    /// Bound on the graceful drain after a termination signal; workers still
    /// alive past it are killed.
    pub graceful_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Interpreter used to run workers.
    pub python_bin: String,
    /// Extra environment passed to every worker.
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Base image reference for the build stage.
    pub base_image: String,
    /// OS packages needed to compile native extensions (database client
    /// headers and a C toolchain by default).
    pub os_packages: Vec<String>,
    /// Dependency manifest, relative to the build context.
    pub manifest: String,
    /// Where the application source tree lands inside the image.
    pub app_root: String,
    /// Port the image exposes. 443 by convention; TLS is terminated by an
    /// external proxy, the workers speak plain HTTP.
    pub expose_port: u16,
    /// When false (the default), dependency installation runs closed-world:
    /// no package cache, and the manifest must be fully pinned.
    pub use_dependency_cache: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            graceful_timeout_seconds: 30,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            python_bin: "python3".to_string(),
            env: HashMap::new(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            base_image: "python:3.11-slim".to_string(),
            os_packages: vec!["gcc".to_string(), "libpq-dev".to_string()],
            manifest: "requirements.txt".to_string(),
            app_root: "/app".to_string(),
            expose_port: 443,
            use_dependency_cache: false,
        }
    }
}

impl Config {
    pub fn load(config_path: &str) -> Result<Self, WharfError> {
        let config_str = std::fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&config_str).map_err(|e| WharfError::ConfigError {
            reason: format!("{config_path}: {e}"),
        })?;
        Ok(config)
    }

    /// Worker count resolution order: explicit flag, then WHARFD_WORKERS,
    /// then the config file value.
    pub fn resolve_workers(&self, flag: Option<usize>) -> Result<usize, WharfError> {
        let count = match flag {
            Some(n) => n,
            None => match std::env::var(WORKERS_ENV) {
                Ok(raw) => raw.parse().map_err(|_| WharfError::ConfigError {
                    reason: format!("{WORKERS_ENV}='{raw}' is not a valid worker count"),
                })?,
                Err(_) => self.pool.workers,
            },
        };
        if count == 0 {
            return Err(WharfError::InvalidWorkerCount { count });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_original_deployment() {
        let config = Config::default();
        assert_eq!(config.pool.workers, 2);
        assert_eq!(config.build.expose_port, 443);
        assert!(!config.build.use_dependency_cache);
        assert_eq!(config.build.os_packages, vec!["gcc", "libpq-dev"]);
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[pool]\nworkers = 4\n\n[build]\nbase_image = \"python:3.12-slim\"\n"
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.pool.workers, 4);
        assert_eq!(config.build.base_image, "python:3.12-slim");
        // untouched sections keep their defaults
        assert_eq!(config.server.bind, "0.0.0.0:8000");
        assert_eq!(config.pool.graceful_timeout_seconds, 30);
    }

    #[test]
    fn flag_overrides_config_workers() {
        let config = Config::default();
        assert_eq!(config.resolve_workers(Some(8)).unwrap(), 8);
    }

    #[test]
    fn zero_workers_rejected() {
        let config = Config::default();
        assert!(matches!(
            config.resolve_workers(Some(0)),
            Err(WharfError::InvalidWorkerCount { count: 0 })
        ));
    }

    #[test]
    fn malformed_config_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pool\nworkers = 4").unwrap();
        assert!(Config::load(file.path().to_str().unwrap()).is_err());
    }
}
