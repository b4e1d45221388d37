// src/engine.rs
//! Level-based active scan.
//!
//! A run walks `LevelStart -> Ingesting -> Dispatching -> Collecting ->
//! LevelDone` once per recursion level. Each level gets its own worker pool;
//! one producer crosses the level's targets with the word source and
//! enqueues a task per candidate while the collector forwards positive
//! results to the sink and records them as the next level's targets.

use crate::backoff::RateController;
use crate::cache::{CachePolicy, ResolutionCache};
use crate::error::Result;
use crate::logging::ScanLogger;
use crate::output::ResultSink;
use crate::pool::WorkerPool;
use crate::resolver::{resolve_with_fallback, Lookup};
use crate::takeover::TakeoverDetector;
use crate::types::{
    ResolutionOutcome, ScanConfig, ScanSummary, SubcollectorError, SubdomainResult,
};
use crate::utils::is_valid_domain;
use crate::wordlist::{WordStream, WordlistSource};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct ScanOrchestrator {
    config: ScanConfig,
    lookup: Arc<dyn Lookup>,
    takeover: Option<Arc<TakeoverDetector>>,
    http: reqwest::Client,
    logger: ScanLogger,
    cache: Option<Arc<ResolutionCache>>,
    backoff: Option<Arc<RateController>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("domain", &self.config.domain)
            .field("workers", &self.config.workers)
            .field("takeover", &self.takeover.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Candidate words for one run, either fully loaded or re-read per target.
enum Words {
    Eager(Arc<[String]>),
    Streamed {
        source: WordlistSource,
        pending: Option<WordStream>,
    },
}

impl Words {
    async fn stream(&mut self, client: &reqwest::Client) -> Result<WordStream> {
        match self {
            Words::Eager(words) => Ok(WordStream::Memory {
                words: words.clone(),
                next: 0,
            }),
            Words::Streamed { source, pending } => match pending.take() {
                Some(stream) => Ok(stream),
                None => source.open(client).await,
            },
        }
    }
}

#[derive(Debug, Default)]
struct LevelReport {
    dispatched: usize,
    cache_hits: usize,
    takeovers: usize,
    discovered: Vec<String>,
}

/// Aborts the cache sweeper when the run ends, however it ends.
struct SweeperGuard(Option<JoinHandle<()>>);

impl Drop for SweeperGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

impl ScanOrchestrator {
    pub fn new(config: ScanConfig, lookup: Arc<dyn Lookup>, logger: ScanLogger) -> Result<Self> {
        if !is_valid_domain(&config.domain) {
            return Err(SubcollectorError::InvalidDomain(config.domain.clone()));
        }
        if config.workers == 0 {
            return Err(SubcollectorError::ConfigError(
                "Worker count must be greater than zero".to_string(),
            ));
        }
        if config.depth == 0 || config.depth < -1 {
            return Err(SubcollectorError::ConfigError(format!(
                "Invalid depth {}: use -1 for unlimited or a positive level count",
                config.depth
            )));
        }

        let takeover = if config.takeover {
            Some(Arc::new(TakeoverDetector::new(
                config.proxy.as_deref(),
                &config.user_agent,
            )?))
        } else {
            None
        };

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.http_timeout)
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| {
                SubcollectorError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        let backoff = if config.backoff.enabled {
            Some(Arc::new(RateController::new(config.backoff.clone())))
        } else {
            None
        };

        Ok(Self {
            config,
            lookup,
            takeover,
            http,
            logger,
            cache: None,
            backoff,
            shutdown: CancellationToken::new(),
        })
    }

    /// Uses `cache` instead of one sized from the wordlist.
    pub fn with_cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Ties the scan to an outer shutdown signal, e.g. Ctrl-C.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn cache(&self) -> Option<&Arc<ResolutionCache>> {
        self.cache.as_ref()
    }

    pub fn rate_controller(&self) -> Option<&Arc<RateController>> {
        self.backoff.as_ref()
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Cancelling this token stops dispatch and abandons queued candidates.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(&mut self, sink: &dyn ResultSink) -> Result<ScanSummary> {
        let started = Instant::now();
        self.logger.info(format_args!(
            "Starting active scan of {} with {} workers (wordlist: {})",
            self.config.domain,
            self.config.workers,
            self.config.wordlist.describe()
        ));

        let size = self.config.wordlist.estimate_size().await?;
        let mut words = self.prepare_words(size).await?;

        let cache = match &self.cache {
            Some(cache) => cache.clone(),
            None => {
                // Later levels multiply the list by every discovered host.
                let recurses = self.config.recursive && self.config.depth != 1;
                let expected = match size {
                    Some(n) if !self.config.streaming && !recurses => n,
                    _ => usize::MAX,
                };
                let policy = CachePolicy::for_volume(
                    expected,
                    self.config.streaming_threshold,
                    &self.config.cache,
                );
                self.logger.debug(format_args!("Resolution cache policy: {:?}", policy));
                let cache = Arc::new(ResolutionCache::new(policy));
                self.cache = Some(cache.clone());
                cache
            }
        };
        let _sweeper = SweeperGuard(cache.spawn_sweeper(self.config.cache.sweep_interval));

        let ctx = TaskContext {
            cache,
            lookup: self.lookup.clone(),
            backoff: self.backoff.clone(),
            takeover: self.takeover.clone(),
            resolvers: self.config.resolvers.iter().cloned().collect(),
            show_ip: self.config.show_ip,
            logger: self.logger.clone(),
        };

        let mut summary = ScanSummary {
            domain: self.config.domain.clone(),
            ..ScanSummary::default()
        };
        let scanned = self.scan_levels(&mut words, &ctx, sink, &mut summary).await;
        let closed = sink.close();
        scanned?;
        closed?;

        summary.duration = started.elapsed();
        self.logger.info(format_args!(
            "Finished {}: {} found over {} level(s), {} candidates, {} cache hits in {:?}",
            summary.domain,
            summary.found,
            summary.levels_completed,
            summary.candidates_dispatched(),
            summary.cache_hits,
            summary.duration
        ));
        Ok(summary)
    }

    /// Small lists are loaded up front; large, unknown-size or explicitly
    /// streamed ones are opened here so that an unreadable source fails
    /// before any worker starts.
    async fn prepare_words(&self, size: Option<usize>) -> Result<Words> {
        let eager = !self.config.streaming
            && matches!(size, Some(n) if n <= self.config.streaming_threshold);

        if eager {
            let mut stream = self.config.wordlist.open(&self.http).await?;
            let mut words = Vec::new();
            while let Some(word) = stream.next_word().await? {
                words.push(word);
            }
            self.warn_invalid_records(&stream);
            self.logger.info(format_args!("Loaded {} words", words.len()));
            return Ok(Words::Eager(words.into()));
        }

        self.logger.info(format_args!(
            "Streaming wordlist {}",
            self.config.wordlist.describe()
        ));
        let stream = self.config.wordlist.open(&self.http).await?;
        Ok(Words::Streamed {
            source: self.config.wordlist.clone(),
            pending: Some(stream),
        })
    }

    async fn scan_levels(
        &self,
        words: &mut Words,
        ctx: &TaskContext,
        sink: &dyn ResultSink,
        summary: &mut ScanSummary,
    ) -> Result<()> {
        let mut emitted = HashSet::new();
        let mut targets = vec![self.config.domain.clone()];
        let mut level = 1;

        loop {
            self.logger.info(format_args!(
                "Level {}: expanding {} target(s)",
                level,
                targets.len()
            ));

            let report = self
                .run_level(&targets, words, ctx, sink, &mut emitted)
                .await?;

            self.logger.info(format_args!(
                "Level {} done: {} candidates, {} new hostnames",
                level,
                report.dispatched,
                report.discovered.len()
            ));

            summary.levels_completed = level;
            summary.dispatched_per_level.push(report.dispatched);
            summary.cache_hits += report.cache_hits;
            summary.takeovers += report.takeovers;
            summary.found += report.discovered.len();

            if self.shutdown.is_cancelled() {
                self.logger.warn(format_args!("Scan of {} cancelled", self.config.domain));
                return Ok(());
            }
            if !self.config.allows_level_after(level) || report.discovered.is_empty() {
                return Ok(());
            }

            targets = report.discovered;
            level += 1;
        }
    }

    async fn run_level(
        &self,
        targets: &[String],
        words: &mut Words,
        ctx: &TaskContext,
        sink: &dyn ResultSink,
        emitted: &mut HashSet<String>,
    ) -> Result<LevelReport> {
        let pool = WorkerPool::with_cancellation(
            self.config.workers,
            self.config.workers * 2,
            &self.shutdown,
        );
        pool.start();
        let Some(mut results) = pool.results() else {
            pool.stop().await;
            return Err(SubcollectorError::ConfigError(
                "Worker pool result channel unavailable".to_string(),
            ));
        };

        let producer = async {
            let dispatched = self.dispatch(&pool, targets, words, ctx).await;
            if dispatched.is_err() {
                pool.cancel();
            }
            pool.stop().await;
            dispatched
        };

        let collector = async {
            let mut takeovers = 0;
            let mut discovered = Vec::new();
            while let Some(result) = results.recv().await {
                if !emitted.insert(result.subdomain.clone()) {
                    continue;
                }
                if result.takeover.is_some() {
                    takeovers += 1;
                }
                discovered.push(result.subdomain.clone());
                sink.accept(result);
            }
            (takeovers, discovered)
        };

        let (dispatched, (takeovers, discovered)) = tokio::join!(producer, collector);
        let (dispatched, cache_hits) = dispatched?;

        Ok(LevelReport {
            dispatched,
            cache_hits,
            takeovers,
            discovered,
        })
    }

    /// Enqueues one task per distinct `word.target` candidate. Returns the
    /// number of candidates generated and how many of them were answered from
    /// cache.
    async fn dispatch(
        &self,
        pool: &WorkerPool<SubdomainResult>,
        targets: &[String],
        words: &mut Words,
        ctx: &TaskContext,
    ) -> Result<(usize, usize)> {
        let mut dispatched = 0;
        let mut cache_hits = 0;
        let mut seen = HashSet::new();

        for target in targets {
            let mut stream = words.stream(&self.http).await?;
            while let Some(word) = stream.next_word().await? {
                if self.shutdown.is_cancelled() {
                    return Ok((dispatched, cache_hits));
                }

                let candidate = format!("{}.{}", word, target).to_lowercase();
                if !seen.insert(candidate.clone()) {
                    continue;
                }
                dispatched += 1;

                let accepted = match ctx.cache.load(&candidate) {
                    Some(outcome) => {
                        cache_hits += 1;
                        if !outcome.found {
                            continue;
                        }
                        pool.add_task(ctx.clone().replay(candidate, outcome)).await
                    }
                    None => pool.add_task(ctx.clone().resolve(candidate)).await,
                };

                if !accepted {
                    return Ok((dispatched, cache_hits));
                }
            }

            self.warn_invalid_records(&stream);
        }

        Ok((dispatched, cache_hits))
    }

    fn warn_invalid_records(&self, stream: &WordStream) {
        let skipped = stream.invalid_records();
        if skipped > 0 {
            self.logger.warn(format_args!(
                "Skipped {} wordlist record(s) that are not valid UTF-8",
                skipped
            ));
        }
    }
}

/// Everything a candidate task needs, cloned into each task.
#[derive(Clone)]
struct TaskContext {
    cache: Arc<ResolutionCache>,
    lookup: Arc<dyn Lookup>,
    backoff: Option<Arc<RateController>>,
    takeover: Option<Arc<TakeoverDetector>>,
    resolvers: Arc<[String]>,
    show_ip: bool,
    logger: ScanLogger,
}

impl TaskContext {
    async fn resolve(self, candidate: String) -> Option<SubdomainResult> {
        if let Some(backoff) = &self.backoff {
            if backoff.is_rate_limited(&candidate, backoff.config().fail_threshold) {
                let delay = backoff.current_delay(&candidate);
                self.logger.debug(format_args!(
                    "Rate limited on {}, waiting {:?}",
                    candidate, delay
                ));
                tokio::time::sleep(delay).await;
            }
        }

        let answer = resolve_with_fallback(self.lookup.as_ref(), &candidate, &self.resolvers).await;

        if let Some(backoff) = &self.backoff {
            let answered = matches!(answer, Ok(_) | Err(SubcollectorError::NoRecords(_)));
            backoff.adaptive_delay(&candidate, answered);
        }

        match answer {
            Ok(addresses) => {
                self.cache
                    .store(&candidate, ResolutionOutcome::found(addresses.clone()));
                self.logger.debug(format_args!("Resolved {} -> {:?}", candidate, addresses));
                Some(self.finish(candidate, addresses).await)
            }
            Err(e) => {
                self.cache.store(&candidate, ResolutionOutcome::not_found());
                self.logger.debug(format_args!("{}", e));
                None
            }
        }
    }

    async fn replay(self, candidate: String, outcome: ResolutionOutcome) -> Option<SubdomainResult> {
        Some(self.finish(candidate, outcome.addresses).await)
    }

    async fn finish(&self, candidate: String, addresses: Vec<String>) -> SubdomainResult {
        let mut result = SubdomainResult::new(candidate);
        if self.show_ip {
            result = result.with_ips(addresses);
        }

        if let Some(detector) = &self.takeover {
            detector.check(&mut result).await;
            if let Some(service) = &result.takeover {
                self.logger.warn(format_args!(
                    "Possible takeover on {} ({})",
                    result.subdomain, service
                ));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CollectingSink;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers from a fixed table; every other name is NXDOMAIN.
    struct StubLookup {
        answers: HashMap<String, Vec<String>>,
        calls: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
        latency: Duration,
    }

    impl StubLookup {
        fn new(hosts: &[(&str, &str)]) -> Arc<Self> {
            Self::slow(hosts, Duration::ZERO)
        }

        fn slow(hosts: &[(&str, &str)], latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                answers: hosts
                    .iter()
                    .map(|(host, ip)| (host.to_string(), vec![ip.to_string()]))
                    .collect(),
                calls: Mutex::new(HashMap::new()),
                total: AtomicUsize::new(0),
                latency,
            })
        }

        fn calls_for(&self, host: &str) -> usize {
            self.calls.lock().unwrap().get(host).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Lookup for StubLookup {
        async fn lookup(&self, host: &str, _nameserver: Option<&str>) -> Result<Vec<String>> {
            self.total.fetch_add(1, Ordering::SeqCst);
            *self.calls.lock().unwrap().entry(host.to_string()).or_default() += 1;
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.answers
                .get(host)
                .cloned()
                .ok_or_else(|| SubcollectorError::NoRecords(host.to_string()))
        }
    }

    /// Every query times out at the transport level.
    struct FailingLookup;

    #[async_trait]
    impl Lookup for FailingLookup {
        async fn lookup(&self, host: &str, _nameserver: Option<&str>) -> Result<Vec<String>> {
            Err(SubcollectorError::ResolutionError(format!("timeout resolving {}", host)))
        }
    }

    fn config(words: &[&str]) -> ScanConfig {
        ScanConfig {
            wordlist: WordlistSource::inline(words.iter().copied()),
            workers: 4,
            ..ScanConfig::for_domain("example.com")
        }
    }

    fn subdomains(sink: &CollectingSink) -> Vec<String> {
        let mut names: Vec<String> = sink.results().into_iter().map(|r| r.subdomain).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_single_level_scan() {
        let lookup = StubLookup::new(&[("www.example.com", "10.0.0.1")]);
        let mut scan =
            ScanOrchestrator::new(config(&["www", "api"]), lookup.clone(), ScanLogger::disabled())
                .unwrap();
        let sink = CollectingSink::new();

        let summary = scan.run(&sink).await.unwrap();

        assert_eq!(sink.results(), vec![SubdomainResult::new("www.example.com")]);
        assert!(sink.is_closed());
        assert_eq!(summary.found, 1);
        assert_eq!(summary.levels_completed, 1);
        assert_eq!(summary.dispatched_per_level, vec![2]);

        let cache = scan.cache().unwrap();
        assert_eq!(cache.load("api.example.com"), Some(ResolutionOutcome::not_found()));
        assert_eq!(
            cache.load("www.example.com"),
            Some(ResolutionOutcome::found(vec!["10.0.0.1".to_string()]))
        );
    }

    #[tokio::test]
    async fn test_show_ip_fills_addresses() {
        let lookup = StubLookup::new(&[("www.example.com", "10.0.0.1")]);
        let mut cfg = config(&["www"]);
        cfg.show_ip = true;
        let mut scan = ScanOrchestrator::new(cfg, lookup, ScanLogger::disabled()).unwrap();
        let sink = CollectingSink::new();

        scan.run(&sink).await.unwrap();

        assert_eq!(sink.results()[0].ips, vec!["10.0.0.1"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_recursion_fans_out_over_discovered_hosts() {
        let lookup = StubLookup::new(&[
            ("www.example.com", "10.0.0.1"),
            ("api.example.com", "10.0.0.2"),
            ("dev.api.example.com", "10.0.0.3"),
        ]);
        let mut cfg = config(&["www", "api", "dev"]);
        cfg.recursive = true;
        cfg.depth = 2;
        let mut scan = ScanOrchestrator::new(cfg, lookup, ScanLogger::disabled()).unwrap();
        let sink = CollectingSink::new();

        let summary = scan.run(&sink).await.unwrap();

        assert_eq!(summary.dispatched_per_level, vec![3, 6]);
        assert_eq!(summary.levels_completed, 2);
        assert_eq!(
            subdomains(&sink),
            vec!["api.example.com", "dev.api.example.com", "www.example.com"]
        );
    }

    #[tokio::test]
    async fn test_recursion_stops_when_level_finds_nothing() {
        let lookup = StubLookup::new(&[("www.example.com", "10.0.0.1")]);
        let mut cfg = config(&["www"]);
        cfg.recursive = true;
        cfg.depth = -1;
        let mut scan = ScanOrchestrator::new(cfg, lookup, ScanLogger::disabled()).unwrap();
        let sink = CollectingSink::new();

        let summary = scan.run(&sink).await.unwrap();

        assert_eq!(summary.levels_completed, 2);
        assert_eq!(summary.dispatched_per_level, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_negative_answers_are_not_resolved_twice() {
        let lookup = StubLookup::new(&[]);
        let cache = Arc::new(ResolutionCache::unbounded());

        for _ in 0..2 {
            let mut scan =
                ScanOrchestrator::new(config(&["api"]), lookup.clone(), ScanLogger::disabled())
                    .unwrap()
                    .with_cache(cache.clone());
            let summary = scan.run(&CollectingSink::new()).await.unwrap();
            assert_eq!(summary.found, 0);
        }

        assert_eq!(lookup.calls_for("api.example.com"), 1);
        assert_eq!(cache.load("api.example.com"), Some(ResolutionOutcome::not_found()));
    }

    #[tokio::test]
    async fn test_cached_positive_is_replayed() {
        let lookup = StubLookup::new(&[]);
        let cache = Arc::new(ResolutionCache::unbounded());
        cache.store(
            "www.example.com",
            ResolutionOutcome::found(vec!["10.0.0.9".to_string()]),
        );

        let mut scan = ScanOrchestrator::new(config(&["www"]), lookup.clone(), ScanLogger::disabled())
            .unwrap()
            .with_cache(cache);
        let sink = CollectingSink::new();
        let summary = scan.run(&sink).await.unwrap();

        assert_eq!(subdomains(&sink), vec!["www.example.com"]);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(lookup.total.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_streamed_wordlist_matches_eager_results() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "www\n\n  api  \nmail").unwrap();

        let lookup = StubLookup::new(&[
            ("www.example.com", "10.0.0.1"),
            ("mail.example.com", "10.0.0.2"),
        ]);
        let mut cfg = config(&[]);
        cfg.wordlist = WordlistSource::File(file.path().to_path_buf());
        cfg.streaming_threshold = 1;
        let mut scan = ScanOrchestrator::new(cfg, lookup, ScanLogger::disabled()).unwrap();
        let sink = CollectingSink::new();

        let summary = scan.run(&sink).await.unwrap();

        assert_eq!(summary.dispatched_per_level, vec![3]);
        assert_eq!(subdomains(&sink), vec!["mail.example.com", "www.example.com"]);
    }

    #[tokio::test]
    async fn test_missing_wordlist_is_fatal() {
        let mut cfg = config(&[]);
        cfg.wordlist = WordlistSource::File("/nonexistent/words.txt".into());
        let mut scan =
            ScanOrchestrator::new(cfg, StubLookup::new(&[]), ScanLogger::disabled()).unwrap();
        let sink = CollectingSink::new();

        let err = scan.run(&sink).await.unwrap_err();

        assert!(matches!(err, SubcollectorError::WordlistLoad(_)));
        assert!(!sink.is_closed());
    }

    #[test]
    fn test_malformed_proxy_is_fatal_with_takeover() {
        let mut cfg = config(&["www"]);
        cfg.takeover = true;
        cfg.proxy = Some("::not a url::".to_string());

        let err = ScanOrchestrator::new(cfg, StubLookup::new(&[]), ScanLogger::disabled())
            .unwrap_err();
        assert!(matches!(err, SubcollectorError::ProxyConfig(_)));
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let lookup = StubLookup::new(&[]);

        let mut cfg = config(&["www"]);
        cfg.domain = "not a domain".to_string();
        assert!(matches!(
            ScanOrchestrator::new(cfg, lookup.clone(), ScanLogger::disabled()),
            Err(SubcollectorError::InvalidDomain(_))
        ));

        let mut cfg = config(&["www"]);
        cfg.workers = 0;
        assert!(ScanOrchestrator::new(cfg, lookup.clone(), ScanLogger::disabled()).is_err());

        let mut cfg = config(&["www"]);
        cfg.depth = 0;
        assert!(ScanOrchestrator::new(cfg, lookup, ScanLogger::disabled()).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_repeated_words_are_resolved_once_per_level() {
        let lookup = StubLookup::slow(
            &[("www.example.com", "10.0.0.1")],
            Duration::from_millis(50),
        );
        let mut scan = ScanOrchestrator::new(
            config(&["www", "WWW", "api", "api"]),
            lookup.clone(),
            ScanLogger::disabled(),
        )
        .unwrap();
        let sink = CollectingSink::new();

        let summary = scan.run(&sink).await.unwrap();

        assert_eq!(lookup.calls_for("www.example.com"), 1);
        assert_eq!(lookup.calls_for("api.example.com"), 1);
        assert_eq!(summary.dispatched_per_level, vec![2]);
        assert_eq!(subdomains(&sink), vec!["www.example.com"]);
    }

    #[tokio::test]
    async fn test_undecodable_wordlist_record_does_not_stop_scan() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"www\ncaf\xe9\napi\n").unwrap();

        // Once loaded up front, once streamed.
        for threshold in [100, 1] {
            let lookup = StubLookup::new(&[("www.example.com", "10.0.0.1")]);
            let mut cfg = config(&[]);
            cfg.wordlist = WordlistSource::File(file.path().to_path_buf());
            cfg.streaming_threshold = threshold;
            let mut scan = ScanOrchestrator::new(cfg, lookup, ScanLogger::disabled()).unwrap();
            let sink = CollectingSink::new();

            let summary = scan.run(&sink).await.unwrap();

            assert_eq!(summary.dispatched_per_level, vec![2]);
            assert_eq!(subdomains(&sink), vec!["www.example.com"]);
        }
    }

    #[tokio::test]
    async fn test_transport_failures_escalate_backoff() {
        let mut cfg = config(&["www", "api"]);
        cfg.backoff.base_delay = Duration::from_millis(1);
        cfg.backoff.max_delay = Duration::from_millis(5);
        let mut scan =
            ScanOrchestrator::new(cfg, Arc::new(FailingLookup), ScanLogger::disabled()).unwrap();

        let summary = scan.run(&CollectingSink::new()).await.unwrap();

        assert_eq!(summary.found, 0);
        let backoff = scan.rate_controller().unwrap();
        assert_eq!(backoff.attempts("example.com"), 2);
        assert_eq!(backoff.request_count("www.example.com"), 2);
    }

    #[tokio::test]
    async fn test_negative_answers_leave_backoff_idle() {
        let mut scan = ScanOrchestrator::new(
            config(&["www", "api", "mail"]),
            StubLookup::new(&[]),
            ScanLogger::disabled(),
        )
        .unwrap();

        scan.run(&CollectingSink::new()).await.unwrap();

        assert_eq!(scan.rate_controller().unwrap().attempts("example.com"), 0);
    }

    #[tokio::test]
    async fn test_disabled_backoff_has_no_controller() {
        let mut cfg = config(&["www"]);
        cfg.backoff.enabled = false;
        let mut scan =
            ScanOrchestrator::new(cfg, Arc::new(FailingLookup), ScanLogger::disabled()).unwrap();

        scan.run(&CollectingSink::new()).await.unwrap();

        assert!(scan.rate_controller().is_none());
    }

    #[tokio::test]
    async fn test_recursive_scan_uses_bounded_cache() {
        let policy_for = |recursive: bool, depth: i32| {
            let mut cfg = config(&["www"]);
            cfg.recursive = recursive;
            cfg.depth = depth;
            cfg
        };

        for (cfg, expected) in [
            (policy_for(false, 1), "unbounded"),
            (policy_for(true, 1), "unbounded"),
            (policy_for(true, 2), "lru-ttl"),
            (policy_for(true, -1), "lru-ttl"),
        ] {
            let mut scan =
                ScanOrchestrator::new(cfg, StubLookup::new(&[]), ScanLogger::disabled()).unwrap();
            scan.run(&CollectingSink::new()).await.unwrap();
            let cache = format!("{:?}", scan.cache().unwrap());
            assert!(cache.contains(expected), "{}", cache);
        }
    }

    #[tokio::test]
    async fn test_cancelled_scan_dispatches_nothing() {
        let lookup = StubLookup::new(&[("www.example.com", "10.0.0.1")]);
        let mut scan =
            ScanOrchestrator::new(config(&["www", "api"]), lookup.clone(), ScanLogger::disabled())
                .unwrap();
        scan.shutdown_token().cancel();
        let sink = CollectingSink::new();

        let summary = scan.run(&sink).await.unwrap();

        assert!(sink.results().is_empty());
        assert_eq!(summary.candidates_dispatched(), 0);
        assert_eq!(lookup.total.load(Ordering::SeqCst), 0);
    }
}
