use bgate_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // `serve` runs in the foreground; everything else logs to the state file.
    if cli.command.logs_to_stderr() || logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = cli.run().await {
        eprintln!("bgate error: {:#}", err);
        std::process::exit(1);
    }
}
