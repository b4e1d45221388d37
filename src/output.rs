// src/output.rs
use crate::error::Result;
use crate::types::{OutputConfig, SubcollectorError, SubdomainResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Receives every discovered hostname once, then `close` at end of run.
pub trait ResultSink: Send + Sync {
    fn accept(&self, result: SubdomainResult);
    fn close(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DomainReport {
    pub domain: String,
    pub subdomains: Vec<SubdomainResult>,
    pub timestamp: String,
}

fn guard<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn format_result(result: &SubdomainResult, show_ip: bool) -> String {
    let mut line = result.subdomain.clone();
    if show_ip && !result.ips.is_empty() {
        line.push_str(&format!(" [{}]", result.ips.join(", ")));
    }
    if let Some(service) = &result.takeover {
        line.push_str(&format!(" [takeover: {}]", service));
    }
    line
}

/// Prints results as they arrive and persists them on `close`.
#[derive(Debug)]
pub struct OutputManager {
    domain: String,
    config: OutputConfig,
    results: Mutex<Vec<SubdomainResult>>,
}

impl OutputManager {
    pub fn new(domain: impl Into<String>, config: OutputConfig) -> Self {
        Self {
            domain: domain.into(),
            config,
            results: Mutex::new(Vec::new()),
        }
    }

    fn write_text_output<W: Write>(&self, writer: &mut W, results: &[SubdomainResult]) -> Result<()> {
        for result in results {
            writeln!(writer, "{}", format_result(result, self.config.show_ip))
                .map_err(|e| SubcollectorError::OutputError(e.to_string()))?;
        }
        Ok(())
    }

    fn write_json_output<W: Write>(&self, writer: &mut W, results: &[SubdomainResult]) -> Result<()> {
        let report = DomainReport {
            domain: self.domain.clone(),
            subdomains: results.to_vec(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| SubcollectorError::OutputError(format!("Failed to serialize JSON: {}", e)))?;

        writeln!(writer, "{}", json).map_err(|e| SubcollectorError::OutputError(e.to_string()))?;
        Ok(())
    }

    fn create_file(file_path: &str) -> Result<File> {
        if let Some(parent) = Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SubcollectorError::OutputError(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        File::create(file_path)
            .map_err(|e| SubcollectorError::OutputError(format!("Failed to create file: {}", e)))
    }
}

impl ResultSink for OutputManager {
    fn accept(&self, result: SubdomainResult) {
        if self.config.silent {
            println!("{}", result.subdomain);
        } else {
            println!("{}", format_result(&result, self.config.show_ip));
        }
        guard(&self.results).push(result);
    }

    fn close(&self) -> Result<()> {
        let mut results = guard(&self.results).clone();
        results.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));

        if let Some(path) = &self.config.text_file {
            let mut file = Self::create_file(path)?;
            self.write_text_output(&mut file, &results)?;
        }
        if let Some(path) = &self.config.json_file {
            let mut file = Self::create_file(path)?;
            self.write_json_output(&mut file, &results)?;
        }
        Ok(())
    }
}

/// Keeps results in memory; for library callers and tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    results: Mutex<Vec<SubdomainResult>>,
    closed: AtomicBool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<SubdomainResult> {
        guard(&self.results).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ResultSink for CollectingSink {
    fn accept(&self, result: SubdomainResult) {
        guard(&self.results).push(result);
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
