// src/session.rs
use crate::error::Result;
use crate::types::SubcollectorError;
use governor::{Jitter, Quota};
use reqwest::Client;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type SourceLimiter = governor::DefaultDirectRateLimiter;

/// HTTP state shared by every passive source.
#[derive(Clone)]
pub struct Session {
    pub client: Client,
    rate_limiters: Arc<HashMap<String, Arc<SourceLimiter>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("rate_limited_sources", &self.rate_limiters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Session {
    /// `rate_limits` maps a source name to its requests per second; sources
    /// without an entry are not throttled.
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        proxy: Option<&str>,
        rate_limits: &HashMap<String, u32>,
    ) -> Result<Self> {
        let mut client_builder = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .gzip(true)
            .deflate(true)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10);

        if let Some(proxy_url) = proxy.filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| SubcollectorError::ProxyConfig(format!("{}: {}", proxy_url, e)))?;
            client_builder = client_builder.proxy(proxy);
        }

        let client = client_builder.build().map_err(|e| {
            SubcollectorError::ConfigError(format!("Failed to build HTTP client: {}", e))
        })?;

        let mut rate_limiters = HashMap::new();
        for (source, per_second) in rate_limits {
            if let Some(limit) = NonZeroU32::new(*per_second) {
                let quota = Quota::per_second(limit).allow_burst(NonZeroU32::MIN);
                rate_limiters.insert(source.clone(), Arc::new(governor::RateLimiter::direct(quota)));
            }
        }

        Ok(Session {
            client,
            rate_limiters: Arc::new(rate_limiters),
        })
    }

    pub fn default_rate_limits() -> HashMap<String, u32> {
        HashMap::from([("hackertarget".to_string(), 2), ("crtsh".to_string(), 1)])
    }

    pub async fn wait_for_rate_limit(&self, source: &str) {
        if let Some(limiter) = self.rate_limiters.get(source) {
            limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                .await;
        }
    }

    /// GET that treats any non-success status as a source error.
    pub async fn get_text(&self, source: &str, url: &str) -> Result<String> {
        self.wait_for_rate_limit(source).await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SubcollectorError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SubcollectorError::SourceError {
                source_name: source.to_string(),
                message: format!("HTTP error: {}", response.status()),
            });
        }

        response
            .text()
            .await
            .map_err(|e| SubcollectorError::NetworkError(e.to_string()))
    }
}
