// src/sources/crtsh.rs
use crate::error::Result;
use crate::session::Session;
use crate::sources::PassiveSource;
use crate::types::SubcollectorError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CrtShEntry {
    name_value: String,
}

/// Certificate transparency logs via crt.sh.
#[derive(Debug, Clone)]
pub struct CrtShSource {
    base_url: String,
}

impl Default for CrtShSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CrtShSource {
    pub fn new() -> Self {
        Self::with_base_url("https://crt.sh")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

/// `name_value` can hold several newline-separated names; wildcards are dropped.
fn parse_entries(body: &str) -> std::result::Result<Vec<String>, serde_json::Error> {
    let entries: Vec<CrtShEntry> = serde_json::from_str(body)?;
    Ok(entries
        .iter()
        .flat_map(|entry| entry.name_value.lines())
        .map(|line| line.trim().to_lowercase())
        .filter(|name| !name.is_empty() && !name.starts_with('*'))
        .collect())
}

#[async_trait]
impl PassiveSource for CrtShSource {
    fn name(&self) -> &str {
        "crtsh"
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>> {
        let url = format!("{}/?q=%25.{}&output=json", self.base_url, domain);
        let body = session.get_text(self.name(), &url).await?;

        parse_entries(&body).map_err(|e| SubcollectorError::SourceError {
            source_name: self.name().to_string(),
            message: format!("Failed to parse JSON: {}", e),
        })
    }
}
