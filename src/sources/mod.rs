// src/sources/mod.rs
use crate::error::Result;
use crate::session::Session;
use async_trait::async_trait;

mod crtsh;
mod hackertarget;

pub use crtsh::CrtShSource;
pub use hackertarget::HackerTargetSource;

/// A passive subdomain source. Returned names may be mixed case, duplicated
/// or outside `domain`; the caller normalises them.
#[async_trait]
pub trait PassiveSource: Send + Sync {
    fn name(&self) -> &str;
    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>>;
}

pub fn create_source(name: &str) -> Option<Box<dyn PassiveSource>> {
    match name.trim().to_lowercase().as_str() {
        "crtsh" => Some(Box::new(CrtShSource::new())),
        "hackertarget" => Some(Box::new(HackerTargetSource::new())),
        _ => None,
    }
}

pub fn source_names() -> &'static [&'static str] {
    &["crtsh", "hackertarget"]
}

pub fn get_all_sources() -> Vec<Box<dyn PassiveSource>> {
    source_names()
        .iter()
        .filter_map(|name| create_source(name))
        .collect()
}
