// src/passive.rs
//! Passive enumeration: merge third-party source answers into the same
//! result model the active scan emits.

use crate::error::Result;
use crate::logging::ScanLogger;
use crate::output::ResultSink;
use crate::resolver::{resolve_with_fallback, Lookup};
use crate::session::Session;
use crate::sources::PassiveSource;
use crate::types::SubdomainResult;
use crate::utils::{deduplicate_subdomains, is_subdomain_of};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Optional address lookup for passive results.
#[derive(Clone)]
pub struct IpLookup {
    pub lookup: Arc<dyn Lookup>,
    pub resolvers: Arc<[String]>,
    pub concurrency: usize,
}

/// Queries every source concurrently and emits the merged, sorted names
/// under `domain` to `sink`. A failing source is logged and skipped.
/// Returns the number of results emitted.
pub async fn run_passive(
    domain: &str,
    sources: &[Box<dyn PassiveSource>],
    session: &Session,
    ip_lookup: Option<&IpLookup>,
    sink: &dyn ResultSink,
    logger: &ScanLogger,
) -> Result<usize> {
    logger.info(format_args!(
        "Enumerating {} with {} passive source(s)",
        domain,
        sources.len()
    ));

    let mut futures = FuturesUnordered::new();
    for source in sources {
        futures.push(async move {
            let start = Instant::now();
            let result = source.enumerate(domain, session).await;
            (source.name(), start.elapsed(), result)
        });
    }

    let mut names = Vec::new();
    while let Some((name, elapsed, result)) = futures.next().await {
        match result {
            Ok(found) => {
                logger.info(format_args!(
                    "{}: {} names for {} in {:?}",
                    name,
                    found.len(),
                    domain,
                    elapsed
                ));
                names.extend(found);
            }
            Err(e) => logger.warn(format_args!("{}: {}", name, e)),
        }
    }

    let mut names: Vec<String> = deduplicate_subdomains(names)
        .into_iter()
        .map(|name| name.trim_end_matches('.').to_string())
        .filter(|name| is_subdomain_of(name, domain))
        .collect();
    names.sort();
    names.dedup();

    let mut results: Vec<SubdomainResult> = names.into_iter().map(SubdomainResult::new).collect();
    if let Some(ip_lookup) = ip_lookup {
        resolve_batch(&mut results, ip_lookup).await;
    }

    let count = results.len();
    for result in results {
        sink.accept(result);
    }
    sink.close()?;

    logger.info(format_args!("Found {} subdomains for {}", count, domain));
    Ok(count)
}

/// Fills in addresses; names that do not resolve keep an empty list.
async fn resolve_batch(results: &mut [SubdomainResult], ip_lookup: &IpLookup) {
    let semaphore = Arc::new(Semaphore::new(ip_lookup.concurrency.max(1)));
    let mut futures = FuturesUnordered::new();

    for (idx, result) in results.iter().enumerate() {
        let semaphore = semaphore.clone();
        let hostname = result.subdomain.clone();
        futures.push(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return (idx, Vec::new());
            };
            let ips = resolve_with_fallback(ip_lookup.lookup.as_ref(), &hostname, &ip_lookup.resolvers)
                .await
                .unwrap_or_default();
            (idx, ips)
        });
    }

    while let Some((idx, ips)) = futures.next().await {
        results[idx].ips = ips;
    }
}
