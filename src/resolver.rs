// src/resolver.rs
use crate::error::Result;
use crate::types::SubcollectorError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use trust_dns_resolver::config::{
    NameServerConfig, Protocol, ResolverConfig as DnsResolverConfig, ResolverOpts,
};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::TokioAsyncResolver;

/// A DNS lookup primitive. `nameserver: None` means the default resolver.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, host: &str, nameserver: Option<&str>) -> Result<Vec<String>>;
}

pub struct DnsResolver {
    default: TokioAsyncResolver,
    by_nameserver: HashMap<String, TokioAsyncResolver>,
}

impl std::fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsResolver")
            .field("nameservers", &self.by_nameserver.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DnsResolver {
    pub fn new(nameservers: &[String], timeout: Duration) -> Result<Self> {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;

        let default = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(_) => TokioAsyncResolver::tokio(DnsResolverConfig::default(), opts.clone()),
        };

        let mut by_nameserver = HashMap::new();
        for ns in nameservers {
            let socket_addr = parse_nameserver(ns)?;
            let mut resolver_config = DnsResolverConfig::new();
            resolver_config.add_name_server(NameServerConfig {
                socket_addr,
                protocol: Protocol::Udp,
                tls_dns_name: None,
                trust_negative_responses: false,
                bind_addr: None,
            });
            by_nameserver.insert(
                ns.clone(),
                TokioAsyncResolver::tokio(resolver_config, opts.clone()),
            );
        }

        Ok(Self {
            default,
            by_nameserver,
        })
    }
}

#[async_trait]
impl Lookup for DnsResolver {
    async fn lookup(&self, host: &str, nameserver: Option<&str>) -> Result<Vec<String>> {
        let resolver = match nameserver {
            None => &self.default,
            Some(ns) => self.by_nameserver.get(ns).ok_or_else(|| {
                SubcollectorError::ResolutionError(format!("Unknown nameserver {}", ns))
            })?,
        };

        resolver
            .lookup_ip(host)
            .await
            .map(|lookup| lookup.iter().map(|ip| ip.to_string()).collect())
            .map_err(|e| match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => SubcollectorError::NoRecords(host.to_string()),
                _ => SubcollectorError::ResolutionError(format!("Failed to resolve {}: {}", host, e)),
            })
    }
}

/// Accepts `ip` or `ip:port`; the port defaults to 53.
pub fn parse_nameserver(value: &str) -> Result<SocketAddr> {
    let value = value.trim();
    if let Ok(addr) = SocketAddr::from_str(value) {
        return Ok(addr);
    }
    IpAddr::from_str(value)
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|e| {
            SubcollectorError::ResolverConfig(format!("Invalid nameserver address {}: {}", value, e))
        })
}

/// Tries each nameserver in order and returns the first non-empty answer.
/// With no nameservers configured the default resolver is used.
pub async fn resolve_with_fallback(
    lookup: &dyn Lookup,
    host: &str,
    nameservers: &[String],
) -> Result<Vec<String>> {
    if nameservers.is_empty() {
        return non_empty(host, lookup.lookup(host, None).await);
    }

    let mut last_error = None;
    for ns in nameservers {
        match non_empty(host, lookup.lookup(host, Some(ns.as_str())).await) {
            Ok(addresses) => return Ok(addresses),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        SubcollectorError::ResolutionError(format!("No resolver answered for {}", host))
    }))
}

fn non_empty(host: &str, result: Result<Vec<String>>) -> Result<Vec<String>> {
    match result {
        Ok(addresses) if addresses.is_empty() => Err(SubcollectorError::NoRecords(host.to_string())),
        other => other,
    }
}

/// One resolver per line; blank lines and `#` comments are skipped.
pub fn load_resolvers(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        SubcollectorError::ResolverConfig(format!("Failed to read {}: {}", path.display(), e))
    })?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// A single argument naming an existing file is a resolver file; otherwise
/// every argument is a comma-separated list of addresses.
pub fn expand_resolver_args(args: &[String]) -> Result<Vec<String>> {
    if let [single] = args {
        let path = Path::new(single.trim());
        if path.is_file() {
            return load_resolvers(path);
        }
    }

    let resolvers: Vec<String> = args
        .iter()
        .flat_map(|arg| arg.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    for resolver in &resolvers {
        parse_nameserver(resolver)?;
    }
    Ok(resolvers)
}
