// src/utils.rs
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Reads non-empty, trimmed lines from a file.
pub fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

/// Counts records without loading the file. `\n`, `\r` and `\r\n` each end
/// one record; a trailing record with no final separator still counts.
pub fn count_lines(path: &Path) -> io::Result<usize> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 32 * 1024];
    let mut count = 0;
    let mut last = None;

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &b in &buf[..n] {
            match b {
                b'\n' if last != Some(b'\r') => count += 1,
                b'\r' => count += 1,
                _ => {}
            }
            last = Some(b);
        }
    }

    if matches!(last, Some(b) if b != b'\n' && b != b'\r') {
        count += 1;
    }
    Ok(count)
}

/// Last two labels of a hostname; hosts with two labels or fewer are returned as-is.
pub fn extract_root_domain(host: &str) -> String {
    let host = host.trim_end_matches('.');
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() <= 2 {
        return host.to_string();
    }
    parts[parts.len() - 2..].join(".")
}

/// Strips whitespace, scheme prefixes and a leading `www.`.
pub fn clean_domain(domain: &str) -> String {
    let domain = domain.trim();
    let domain = domain.strip_prefix("http://").unwrap_or(domain);
    let domain = domain.strip_prefix("https://").unwrap_or(domain);
    let domain = domain.strip_prefix("www.").unwrap_or(domain);
    domain.trim_end_matches('/').to_lowercase()
}

/// Check if a string is a valid domain
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }

    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() < 2 {
        return false;
    }

    for part in parts {
        if part.is_empty() || part.len() > 63 {
            return false;
        }

        if !part.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return false;
        }

        if part.starts_with('-') || part.ends_with('-') {
            return false;
        }
    }

    true
}

pub fn is_subdomain_of(domain: &str, parent: &str) -> bool {
    let domain = domain.trim_end_matches('.');
    let parent = parent.trim_end_matches('.');
    domain != parent && domain.ends_with(&format!(".{}", parent))
}

/// Remove duplicate subdomains (case-insensitive)
pub fn deduplicate_subdomains(subdomains: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for subdomain in subdomains {
        let lower = subdomain.to_lowercase();
        if seen.insert(lower.clone()) {
            unique.push(lower);
        }
    }

    unique
}
