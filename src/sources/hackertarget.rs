// src/sources/hackertarget.rs
use crate::error::Result;
use crate::session::Session;
use crate::sources::PassiveSource;
use crate::types::SubcollectorError;
use async_trait::async_trait;

/// HackerTarget host search API
#[derive(Debug, Clone)]
pub struct HackerTargetSource {
    base_url: String,
}

impl Default for HackerTargetSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HackerTargetSource {
    pub fn new() -> Self {
        Self::with_base_url("https://api.hackertarget.com")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

/// Lines look like `host,ip`. The API reports quota and lookup problems as
/// a single `error ...` or `API count exceeded` line with a 200 status.
fn parse_hosts(body: &str) -> std::result::Result<Vec<String>, String> {
    let mut hosts = Vec::new();
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("error") || line.starts_with("API count exceeded") {
            return Err(line.to_string());
        }
        if let Some(host) = line.split(',').next() {
            hosts.push(host.trim().to_lowercase());
        }
    }
    Ok(hosts)
}

#[async_trait]
impl PassiveSource for HackerTargetSource {
    fn name(&self) -> &str {
        "hackertarget"
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>> {
        let url = format!("{}/hostsearch/?q={}", self.base_url, domain);
        let body = session.get_text(self.name(), &url).await?;

        parse_hosts(&body).map_err(|message| SubcollectorError::SourceError {
            source_name: self.name().to_string(),
            message,
        })
    }
}
