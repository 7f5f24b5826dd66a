use certworker_core::WorkerError;
use clap::Parser;

mod args;
mod commands;
mod logging;

use args::Cli;
use commands::dispatch;

/// Exit code for failures that carry no worker error (I/O, bad config file path).
const INTERNAL_ERROR: i32 = 1;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(&cli.global.log_level, cli.global.json_logs);

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:?}");
            e.downcast_ref::<WorkerError>()
                .map(WorkerError::exit_code)
                .unwrap_or(INTERNAL_ERROR)
        }
    };
    std::process::exit(code);
}
