// src/types.rs
use crate::wordlist::WordlistSource;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_WORDLIST_URL: &str =
    "https://raw.githubusercontent.com/danielmiessler/SecLists/refs/heads/master/Discovery/DNS/subdomains-top1million-110000.txt";

/// Immutable configuration for one active scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub domain: String,
    pub wordlist: WordlistSource,
    pub resolvers: Vec<String>,
    pub workers: usize,
    pub backoff: BackoffConfig,
    pub recursive: bool,
    /// `-1` is unlimited, `1` scans the root domain only.
    pub depth: i32,
    pub takeover: bool,
    pub proxy: Option<String>,
    pub show_ip: bool,
    /// Forces streamed ingestion regardless of the wordlist size.
    pub streaming: bool,
    pub streaming_threshold: usize,
    pub cache: CacheConfig,
    pub http_timeout: Duration,
    pub dns_timeout: Duration,
    pub user_agent: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            wordlist: WordlistSource::Url(DEFAULT_WORDLIST_URL.to_string()),
            resolvers: Vec::new(),
            workers: 10,
            backoff: BackoffConfig::default(),
            recursive: false,
            depth: 1,
            takeover: false,
            proxy: None,
            show_ip: false,
            streaming: false,
            streaming_threshold: 10_000,
            cache: CacheConfig::default(),
            http_timeout: Duration::from_secs(5),
            dns_timeout: Duration::from_secs(5),
            user_agent: format!("subcollector/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ScanConfig {
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    /// Whether another level may follow `level` (1-based).
    pub fn allows_level_after(&self, level: usize) -> bool {
        self.recursive && (self.depth == -1 || (level as i64) < self.depth as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffConfig {
    pub enabled: bool,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub fail_threshold: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
            jitter: 0.3,
            fail_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub text_file: Option<String>,
    pub json_file: Option<String>,
    pub show_ip: bool,
    pub silent: bool,
}

/// Cached outcome of resolving one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub found: bool,
    pub addresses: Vec<String>,
}

impl ResolutionOutcome {
    pub fn found(addresses: Vec<String>) -> Self {
        Self {
            found: true,
            addresses,
        }
    }

    pub fn not_found() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubdomainResult {
    pub subdomain: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub takeover: Option<String>,
}

impl SubdomainResult {
    pub fn new(subdomain: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            ips: Vec::new(),
            takeover: None,
        }
    }

    pub fn with_ips(mut self, ips: Vec<String>) -> Self {
        self.ips = ips;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub domain: String,
    pub levels_completed: usize,
    /// Candidates dispatched per level, in level order.
    pub dispatched_per_level: Vec<usize>,
    pub found: usize,
    pub takeovers: usize,
    pub cache_hits: usize,
    pub duration: Duration,
}

impl ScanSummary {
    pub fn candidates_dispatched(&self) -> usize {
        self.dispatched_per_level.iter().sum()
    }
}

#[derive(Debug, Error)]
pub enum SubcollectorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Wordlist error: {0}")]
    WordlistLoad(String),

    #[error("Invalid proxy URL: {0}")]
    ProxyConfig(String),

    #[error("Resolver configuration error: {0}")]
    ResolverConfig(String),

    #[error("Source error in {source_name}: {message}")]
    SourceError {
        source_name: String,
        message: String,
    },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Resolution error: {0}")]
    ResolutionError(String),

    /// An authoritative negative answer, as opposed to a failed exchange.
    #[error("No records for {0}")]
    NoRecords(String),

    #[error("Output error: {0}")]
    OutputError(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}
