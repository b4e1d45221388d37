use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use subcollector::cli::{ActiveArgs, Args, Command, PassiveArgs, TargetArgs};
use subcollector::config::{self, FileConfig};
use subcollector::output::OutputManager;
use subcollector::passive::{run_passive, IpLookup};
use subcollector::resolver::{expand_resolver_args, DnsResolver, Lookup};
use subcollector::session::Session;
use subcollector::sources::{self, PassiveSource};
use subcollector::types::{OutputConfig, ScanConfig};
use subcollector::utils::{clean_domain, deduplicate_subdomains, read_lines};
use subcollector::wordlist::WordlistSource;
use subcollector::{ScanLogger, ScanOrchestrator};
use tokio_util::sync::CancellationToken;

const BANNER: &str = r#"
           _                _ _           _
 ___ _   _| |__   ___ ___ | | | ___  ___| |_ ___  _ __
/ __| | | | '_ \ / __/ _ \| | |/ _ \/ __| __/ _ \| '__|
\__ \ |_| | |_) | (_| (_) | | |  __/ (__| || (_) | |
|___/\__,_|_.__/ \___\___/|_|_|\___|\___|\__\___/|_|
"#;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let logger = ScanLogger::new(args.verbose, args.silent);

    if !args.silent {
        eprintln!("{}", BANNER);
        eprintln!(
            "        v{} ({}, built {})\n",
            subcollector::VERSION,
            env!("SUBCOLLECTOR_GIT_HASH"),
            env!("SUBCOLLECTOR_BUILD_TIME")
        );
    }

    let file_config = match &args.config_path {
        Some(path) => config::load_config(path)?,
        None => config::from_env()?,
    };

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let signal_logger = logger.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_logger.warn(format_args!("Interrupted, stopping after in-flight lookups"));
            signal.cancel();
        }
    });

    let outcome = match &args.command {
        Command::Active(active) => run_active(&args, active, &file_config, &logger, &shutdown).await,
        Command::Passive(passive) => {
            run_passive_command(&args, passive, &file_config, &logger, &shutdown).await
        }
    };

    if let Err(e) = &outcome {
        logger.error(format_args!("{:#}", e));
    }
    logger.flush();
    outcome
}

async fn run_active(
    args: &Args,
    active: &ActiveArgs,
    file_config: &FileConfig,
    logger: &ScanLogger,
    shutdown: &CancellationToken,
) -> Result<()> {
    let domains = get_domains(&active.target, logger)?;
    let template = build_scan_config(active, file_config)?;
    let lookup: Arc<dyn Lookup> = Arc::new(
        DnsResolver::new(&template.resolvers, template.dns_timeout)
            .context("Failed to initialise DNS resolvers")?,
    );

    let multiple = domains.len() > 1;
    for domain in domains {
        if shutdown.is_cancelled() {
            break;
        }

        let config = ScanConfig {
            domain: domain.clone(),
            ..template.clone()
        };
        let sink = OutputManager::new(&domain, output_config(&active.target, &domain, multiple, args.silent));

        let scan = ScanOrchestrator::new(config, lookup.clone(), logger.clone());
        let mut scan = match scan {
            Ok(scan) => scan.with_shutdown(shutdown.child_token()),
            Err(e) if multiple => {
                logger.error(format_args!("Skipping {}: {}", domain, e));
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match scan.run(&sink).await {
            Ok(summary) => {
                if !args.silent {
                    logger.info(format_args!(
                        "{}: {} subdomains ({} possible takeovers) in {:.2}s",
                        summary.domain,
                        summary.found,
                        summary.takeovers,
                        summary.duration.as_secs_f64()
                    ));
                }
            }
            Err(e) if multiple => logger.error(format_args!("Scan of {} failed: {}", domain, e)),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn build_scan_config(active: &ActiveArgs, file_config: &FileConfig) -> Result<ScanConfig> {
    let mut config = ScanConfig::default();
    file_config.apply_to(&mut config);

    if let Some(wordlist) = &active.wordlist {
        config.wordlist = WordlistSource::parse(wordlist);
    }
    if !active.resolvers.is_empty() {
        config.resolvers = expand_resolver_args(&active.resolvers)?;
    }
    if let Some(rate_limit) = active.rate_limit {
        config.backoff.base_delay = std::time::Duration::from_millis(rate_limit);
    }
    if let Some(depth) = active.depth {
        config.depth = depth;
    }
    if let Some(workers) = active.workers {
        config.workers = workers;
    }
    if active.proxy.is_some() {
        config.proxy = active.proxy.clone();
    }
    config.recursive = active.recursive;
    config.takeover = active.takeover;
    config.streaming = active.stream;
    config.show_ip = active.target.show_ip;

    Ok(config)
}

async fn run_passive_command(
    args: &Args,
    passive: &PassiveArgs,
    file_config: &FileConfig,
    logger: &ScanLogger,
    shutdown: &CancellationToken,
) -> Result<()> {
    if passive.list_sources {
        println!("Available sources:\n");
        for name in sources::source_names() {
            println!("  {}", name);
        }
        return Ok(());
    }

    let names = passive
        .sources
        .clone()
        .unwrap_or_else(|| file_config.passive.sources.clone());
    let selected: Vec<Box<dyn PassiveSource>> = names
        .iter()
        .filter_map(|name| {
            let source = sources::create_source(name);
            if source.is_none() {
                logger.warn(format_args!("Unknown source: {}", name));
            }
            source
        })
        .collect();
    if selected.is_empty() {
        anyhow::bail!("No valid sources configured");
    }

    let domains = get_domains(&passive.target, logger)?;
    let scan_defaults = {
        let mut defaults = ScanConfig::default();
        file_config.apply_to(&mut defaults);
        defaults
    };
    let session = Session::new(
        scan_defaults.http_timeout.max(std::time::Duration::from_secs(30)),
        &scan_defaults.user_agent,
        file_config.proxy.as_deref(),
        &file_config.passive.rate_limits,
    )?;

    let ip_lookup = if passive.target.show_ip {
        Some(IpLookup {
            lookup: Arc::new(DnsResolver::new(
                &scan_defaults.resolvers,
                scan_defaults.dns_timeout,
            )?),
            resolvers: scan_defaults.resolvers.iter().cloned().collect(),
            concurrency: scan_defaults.workers,
        })
    } else {
        None
    };

    let multiple = domains.len() > 1;
    for domain in domains {
        if shutdown.is_cancelled() {
            break;
        }
        let sink = OutputManager::new(&domain, output_config(&passive.target, &domain, multiple, args.silent));
        if let Err(e) = run_passive(&domain, &selected, &session, ip_lookup.as_ref(), &sink, logger).await {
            if !multiple {
                return Err(e.into());
            }
            logger.error(format_args!("Passive enumeration of {} failed: {}", domain, e));
        }
    }

    Ok(())
}

fn output_config(target: &TargetArgs, domain: &str, multiple: bool, silent: bool) -> OutputConfig {
    let path_for = |path: &String| {
        if multiple {
            per_domain_path(Path::new(path), domain).to_string_lossy().to_string()
        } else {
            path.clone()
        }
    };

    OutputConfig {
        text_file: target.output_file.as_ref().map(path_for),
        json_file: target.json_file.as_ref().map(path_for),
        show_ip: target.show_ip,
        silent,
    }
}

/// `out/results.txt` becomes `out/results_example.com.txt`.
fn per_domain_path(path: &Path, domain: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, domain, ext.to_string_lossy()),
        None => format!("{}_{}", stem, domain),
    };
    path.with_file_name(name)
}

fn get_domains(target: &TargetArgs, logger: &ScanLogger) -> Result<Vec<String>> {
    let mut domains = target.domain.clone();

    if let Some(file_path) = &target.domains_file {
        let lines = read_lines(file_path)
            .with_context(|| format!("Failed to read domains from {}", file_path.display()))?;
        domains.extend(lines);
    }

    if target.use_stdin() {
        logger.debug(format_args!("Reading domains from stdin"));
        for line in io::stdin().lock().lines() {
            domains.push(line.context("Failed to read stdin")?);
        }
    }

    let domains: Vec<String> = deduplicate_subdomains(
        domains
            .iter()
            .map(|d| clean_domain(d))
            .filter(|d| !d.is_empty())
            .collect(),
    );
    if domains.is_empty() {
        anyhow::bail!("No input provided. Use -d <domain>, -l <file>, or pipe domains to stdin");
    }
    Ok(domains)
}
