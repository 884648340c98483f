//! Plugin Cache CLI Binary

use clap::Parser;
use plugin_cache::logging::init_logging;
use plugin_cache::tooling::cli::{Cli, CliContext, CommandFailed};
use plugin_cache::SyncError;
use std::process;

fn main() {
    let cli = Cli::parse();

    let context = match CliContext::new(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error initializing plugin cache: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(&context.config().logging) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    match context.execute(&cli.command) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(SyncError::Callback(e)) => {
            let code = e
                .downcast_ref::<CommandFailed>()
                .and_then(|failed| failed.code)
                .unwrap_or(1);
            eprintln!("Error: {}", e);
            process::exit(code);
        }
        Err(e) => {
            eprintln!("Error ({}): {}", e.stage(), e);
            process::exit(1);
        }
    }
}
