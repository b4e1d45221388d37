// src/cli.rs
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "subcollector",
    version,
    about = "Active and passive subdomain discovery",
    long_about = "subcollector brute-forces subdomains from a wordlist with adaptive backoff, optional recursion and takeover checks,\nor collects them passively from public sources."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Silent mode (only output subdomains)
    #[arg(long = "silent", global = true)]
    pub silent: bool,

    /// Verbose mode
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true)]
    pub config_path: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve wordlist candidates against the target
    Active(ActiveArgs),
    /// Query public sources without touching the target
    Passive(PassiveArgs),
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Target domain(s)
    #[arg(short = 'd', long = "domain", value_name = "DOMAIN")]
    pub domain: Vec<String>,

    /// File containing list of domains
    #[arg(short = 'l', long = "list", value_name = "FILE")]
    pub domains_file: Option<PathBuf>,

    /// Show resolved IP addresses
    #[arg(short = 's', long = "show-ip")]
    pub show_ip: bool,

    /// Text output file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_file: Option<String>,

    /// JSON output file
    #[arg(short = 'j', long = "json-output", value_name = "FILE")]
    pub json_file: Option<String>,
}

impl TargetArgs {
    /// Read domains from stdin when nothing else was given and input is piped
    pub fn use_stdin(&self) -> bool {
        self.domain.is_empty() && self.domains_file.is_none() && !atty::is(atty::Stream::Stdin)
    }
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ActiveArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Wordlist path or http(s) URL (defaults to the SecLists top 110k list)
    #[arg(short = 'w', long = "wordlist", value_name = "PATH|URL")]
    pub wordlist: Option<String>,

    /// Resolvers as a comma-separated list, or a file with one per line
    #[arg(short = 'r', long = "resolvers", value_delimiter = ',')]
    pub resolvers: Vec<String>,

    /// Backoff base delay in milliseconds
    #[arg(short = 't', long = "rate-limit", value_name = "MS")]
    pub rate_limit: Option<u64>,

    /// Recurse into discovered subdomains
    #[arg(short = 'R', long = "recursive")]
    pub recursive: bool,

    /// Recursion depth, -1 for unlimited
    #[arg(short = 'D', long = "depth", allow_hyphen_values = true)]
    pub depth: Option<i32>,

    /// Check discovered hosts for subdomain takeover
    #[arg(short = 'T', long = "takeover")]
    pub takeover: bool,

    /// HTTP proxy for takeover checks
    #[arg(short = 'p', long = "proxy")]
    pub proxy: Option<String>,

    /// Number of concurrent workers
    #[arg(short = 'W', long = "workers")]
    pub workers: Option<usize>,

    /// Always stream the wordlist instead of loading it
    #[arg(short = 'S', long = "stream")]
    pub stream: bool,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct PassiveArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Specific sources to use (comma-separated)
    #[arg(long = "sources", value_delimiter = ',')]
    pub sources: Option<Vec<String>>,

    /// List all available sources
    #[arg(long = "list-sources")]
    pub list_sources: bool,
}
