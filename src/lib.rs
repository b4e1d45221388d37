// src/lib.rs
pub mod backoff;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod output;
pub mod passive;
pub mod pool;
pub mod resolver;
pub mod session;
pub mod sources;
pub mod takeover;
pub mod types;
pub mod utils;
pub mod wordlist;

pub use backoff::RateController;
pub use cache::{CachePolicy, ResolutionCache};
pub use engine::ScanOrchestrator;
pub use logging::ScanLogger;
pub use output::{CollectingSink, OutputManager, ResultSink};
pub use pool::WorkerPool;
pub use resolver::{DnsResolver, Lookup};
pub use takeover::TakeoverDetector;
pub use types::{ScanConfig, ScanSummary, SubcollectorError, SubdomainResult};
pub use wordlist::WordlistSource;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
