//! clkit CLI application
//!
//! Lists compute platforms and runs the bundled vector-add and
//! matrix-multiply kernels through the clkit helper chain.

use clap::Parser;
use clkit_cli::{Cli, EXIT_GENERIC_FAIL, commands, logging, resolve_config};
use tracing::error;

fn main() {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(EXIT_GENERIC_FAIL);
        }
    };

    if let Err(e) = logging::setup_logging(config.log_level, cli.log_format) {
        eprintln!("warning: {e}");
    }

    if let Err(e) = commands::execute(&cli.command, &config) {
        error!("Command failed: {}", e);

        let mut source = e.source();
        while let Some(err) = source {
            error!("  Caused by: {}", err);
            source = err.source();
        }

        std::process::exit(EXIT_GENERIC_FAIL);
    }
}
