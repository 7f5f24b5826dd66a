use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "certworker",
    version,
    about = "Crypto-verification job worker: signature checks and key derivation behind a tiered certificate cache"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve jobs from stdin, one per line, writing one response per line to stdout
    Run(RunArgs),
    /// Handle a single job and print its response
    Exec(ExecArgs),
    /// Load and validate configuration, then print the effective settings
    CheckConfig,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// YAML configuration file (top level or a `crypto-worker` section)
    #[arg(long, short = 'c', global = true, env = "CERTWORKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Memory-tier TTL in seconds (0 = never expire)
    #[arg(long, global = true)]
    pub memory_ttl: Option<u64>,

    /// Run without the process-local memory tier
    #[arg(long, global = true)]
    pub no_memory_cache: bool,

    /// Shared-tier address (host:port or redis:// URL)
    #[arg(long, global = true)]
    pub memcache_host: Option<String>,

    /// Shared-tier TTL in seconds
    #[arg(long, global = true)]
    pub memcache_ttl: Option<u64>,

    /// Seed the load-test certificate
    #[arg(long, global = true)]
    pub loadtest: bool,

    /// Origin fetch timeout in seconds
    #[arg(long, global = true)]
    pub fetch_timeout: Option<u64>,

    /// Origin fetch scheme (https or http)
    #[arg(long, global = true)]
    pub fetch_scheme: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Stop at the first job that fails with a non-domain error
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    /// Raw job: `<function_id>::<json payload>`
    pub job: String,
}
