// src/config.rs
use crate::error::{ErrorContext, Result};
use crate::types::{BackoffConfig, CacheConfig, ScanConfig, SubcollectorError};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// On-disk defaults. Every key is optional; command-line flags win over it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub resolvers: Vec<String>,
    pub workers: usize,
    /// Backoff base delay in milliseconds.
    pub rate_limit: u64,
    pub streaming_threshold: usize,
    /// Seconds.
    pub http_timeout: u64,
    /// Seconds.
    pub dns_timeout: u64,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub backoff: FileBackoff,
    pub cache: FileCache,
    pub passive: FilePassive,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileBackoff {
    pub enabled: bool,
    pub max_delay_ms: u64,
    pub factor: f64,
    pub jitter: f64,
    pub fail_threshold: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileCache {
    pub capacity: usize,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilePassive {
    pub sources: Vec<String>,
    /// Requests per second per source; `0` disables throttling.
    pub rate_limits: HashMap<String, u32>,
}

impl Default for FileConfig {
    fn default() -> Self {
        let scan = ScanConfig::default();
        Self {
            resolvers: Vec::new(),
            workers: scan.workers,
            rate_limit: scan.backoff.base_delay.as_millis() as u64,
            streaming_threshold: scan.streaming_threshold,
            http_timeout: scan.http_timeout.as_secs(),
            dns_timeout: scan.dns_timeout.as_secs(),
            user_agent: None,
            proxy: None,
            backoff: FileBackoff::default(),
            cache: FileCache::default(),
            passive: FilePassive::default(),
        }
    }
}

impl Default for FileBackoff {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            enabled: backoff.enabled,
            max_delay_ms: backoff.max_delay.as_millis() as u64,
            factor: backoff.factor,
            jitter: backoff.jitter,
            fail_threshold: backoff.fail_threshold,
        }
    }
}

impl Default for FileCache {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            capacity: cache.capacity,
            ttl_secs: cache.ttl.as_secs(),
            sweep_interval_secs: cache.sweep_interval.as_secs(),
        }
    }
}

impl Default for FilePassive {
    fn default() -> Self {
        Self {
            sources: crate::sources::source_names()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rate_limits: crate::session::Session::default_rate_limits(),
        }
    }
}

impl FileConfig {
    /// Copies the file settings onto `config`, leaving the target-specific
    /// fields (domain, wordlist, recursion, takeover) alone.
    pub fn apply_to(&self, config: &mut ScanConfig) {
        config.resolvers = self.resolvers.clone();
        config.workers = self.workers;
        config.streaming_threshold = self.streaming_threshold;
        config.http_timeout = Duration::from_secs(self.http_timeout);
        config.dns_timeout = Duration::from_secs(self.dns_timeout);
        if let Some(user_agent) = &self.user_agent {
            config.user_agent = user_agent.clone();
        }
        if self.proxy.is_some() {
            config.proxy = self.proxy.clone();
        }

        config.backoff = BackoffConfig {
            enabled: self.backoff.enabled,
            base_delay: Duration::from_millis(self.rate_limit),
            max_delay: Duration::from_millis(self.backoff.max_delay_ms),
            factor: self.backoff.factor,
            jitter: self.backoff.jitter,
            fail_threshold: self.backoff.fail_threshold,
        };
        config.cache = CacheConfig {
            capacity: self.cache.capacity,
            ttl: Duration::from_secs(self.cache.ttl_secs),
            sweep_interval: Duration::from_secs(self.cache.sweep_interval_secs),
        };
    }
}

/// Reads `path` if it exists, then applies environment overrides and
/// validates the result.
pub fn load_config(path: &str) -> Result<FileConfig> {
    let mut config = if Path::new(path).exists() {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path))?;
        toml::from_str::<FileConfig>(&contents).with_context(|| format!("Failed to parse config file {}", path))?
    } else {
        FileConfig::default()
    };

    apply_env_overrides(&mut config, |key| env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Defaults plus environment overrides, for runs without a config file.
pub fn from_env() -> Result<FileConfig> {
    let mut config = FileConfig::default();
    apply_env_overrides(&mut config, |key| env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

pub fn apply_env_overrides<F>(config: &mut FileConfig, var: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(resolvers) = var("SUBCOLLECTOR_RESOLVERS") {
        config.resolvers = resolvers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(workers) = var("SUBCOLLECTOR_WORKERS") {
        config.workers = workers
            .trim()
            .parse()
            .with_context(|| format!("Invalid SUBCOLLECTOR_WORKERS value {:?}", workers))?;
    }
    if let Some(proxy) = var("SUBCOLLECTOR_PROXY") {
        config.proxy = Some(proxy.trim().to_string()).filter(|p| !p.is_empty());
    }
    Ok(())
}

pub fn validate_config(config: &FileConfig) -> Result<()> {
    if config.workers == 0 {
        return Err(SubcollectorError::ConfigError(
            "Worker count must be greater than 0".to_string(),
        ));
    }
    if config.http_timeout == 0 || config.dns_timeout == 0 {
        return Err(SubcollectorError::ConfigError(
            "Timeouts must be greater than 0".to_string(),
        ));
    }
    if config.backoff.factor < 1.0 {
        return Err(SubcollectorError::ConfigError(format!(
            "Backoff factor must be at least 1.0, got {}",
            config.backoff.factor
        )));
    }
    if !(0.0..=1.0).contains(&config.backoff.jitter) {
        return Err(SubcollectorError::ConfigError(format!(
            "Backoff jitter must be within [0, 1], got {}",
            config.backoff.jitter
        )));
    }
    if config.cache.capacity == 0 {
        return Err(SubcollectorError::ConfigError(
            "Cache capacity must be greater than 0".to_string(),
        ));
    }
    if config.resolvers.iter().any(|r| r.trim().is_empty()) {
        return Err(SubcollectorError::ConfigError(
            "Resolver entries must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config("/nonexistent/subcollector.toml").unwrap();
        assert_eq!(config.cache.capacity, 10_000);
        assert_eq!(config.backoff.fail_threshold, 3);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "workers = 32\nrate_limit = 250\nresolvers = [\"1.1.1.1\"]\n\n[cache]\nttl_secs = 60"
        )
        .unwrap();

        let config = load_config(&file.path().to_string_lossy()).unwrap();
        assert_eq!(config.workers, 32);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.capacity, 10_000);

        let mut scan = ScanConfig::for_domain("example.com");
        config.apply_to(&mut scan);
        assert_eq!(scan.workers, 32);
        assert_eq!(scan.backoff.base_delay, Duration::from_millis(250));
        assert_eq!(scan.cache.ttl, Duration::from_secs(60));
        assert_eq!(scan.resolvers, vec!["1.1.1.1"]);
        assert_eq!(scan.domain, "example.com");
    }

    #[test]
    fn test_unparseable_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = \"many\"").unwrap();
        let err = load_config(&file.path().to_string_lossy()).unwrap_err();
        assert!(matches!(err, SubcollectorError::ConfigError(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SUBCOLLECTOR_RESOLVERS", "8.8.8.8, 9.9.9.9"),
            ("SUBCOLLECTOR_WORKERS", "4"),
            ("SUBCOLLECTOR_PROXY", "socks5://127.0.0.1:9050"),
        ]);
        let mut config = FileConfig::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.resolvers, vec!["8.8.8.8", "9.9.9.9"]);
        assert_eq!(config.workers, 4);
        assert_eq!(config.proxy.as_deref(), Some("socks5://127.0.0.1:9050"));

        let bad = apply_env_overrides(&mut config, |key| {
            (key == "SUBCOLLECTOR_WORKERS").then(|| "lots".to_string())
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = FileConfig::default();
        assert!(validate_config(&config).is_ok());

        config.backoff.jitter = 1.5;
        assert!(validate_config(&config).is_err());

        let mut config = FileConfig::default();
        config.backoff.factor = 0.5;
        assert!(validate_config(&config).is_err());

        let mut config = FileConfig::default();
        config.workers = 0;
        assert!(validate_config(&config).is_err());
    }
}
