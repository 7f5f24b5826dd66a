use anyhow::Context;
use certworker_core::{Worker, WorkerConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::args::{Cli, Command, ExecArgs, GlobalArgs, RunArgs};

pub const SUCCESS: i32 = 0;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = resolve_config(&cli.global)?;

    match cli.cmd {
        Command::Run(args) => run(&config, args).await,
        Command::Exec(args) => exec(&config, args).await,
        Command::CheckConfig => check_config(&config),
    }
}

/// Defaults, then the config file, then the environment, then flags.
pub fn resolve_config(global: &GlobalArgs) -> anyhow::Result<WorkerConfig> {
    let base = match &global.config {
        Some(path) => WorkerConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => WorkerConfig::default(),
    };

    let mut config = base.with_env_overrides();
    if let Some(ttl) = global.memory_ttl {
        config.memory_ttl = ttl;
    }
    if global.no_memory_cache {
        config.memory_cache = false;
    }
    if let Some(host) = &global.memcache_host {
        config.memcache_host = Some(host.clone());
    }
    if let Some(ttl) = global.memcache_ttl {
        config.memcache_ttl = Some(ttl);
    }
    if global.loadtest {
        config.loadtest_mode = true;
    }
    if let Some(timeout) = global.fetch_timeout {
        config.fetch_timeout_secs = timeout;
    }
    if let Some(scheme) = &global.fetch_scheme {
        config.fetch_scheme = scheme.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run(config: &WorkerConfig, args: RunArgs) -> anyhow::Result<i32> {
    let worker = Worker::from_config(config).await?;
    tracing::info!(functions = ?worker.dispatcher().function_ids().collect::<Vec<_>>(), "worker ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut handled: u64 = 0;
    let mut failed: u64 = 0;

    while let Some(line) = lines.next_line().await.context("failed to read job")? {
        if line.trim().is_empty() {
            continue;
        }
        handled += 1;

        match worker.handle(line.as_bytes()).await {
            Ok(response) => stdout.write_all(&response).await?,
            Err(e) => {
                failed += 1;
                tracing::error!(error = %e, exit_code = e.exit_code(), "job failed");
                if args.fail_fast {
                    stdout.flush().await?;
                    return Err(e.into());
                }
            }
        }
        // One line per job, empty for a failed one.
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    tracing::info!(handled, failed, "input closed, shutting down");
    Ok(SUCCESS)
}

async fn exec(config: &WorkerConfig, args: ExecArgs) -> anyhow::Result<i32> {
    let worker = Worker::from_config(config).await?;
    let response = worker.handle(args.job.as_bytes()).await?;
    println!("{}", String::from_utf8_lossy(&response));
    Ok(SUCCESS)
}

fn check_config(config: &WorkerConfig) -> anyhow::Result<i32> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(SUCCESS)
}
