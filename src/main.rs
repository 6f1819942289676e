use std::env;

use clap::{CommandFactory, Parser};
use ordertree::cli::commands::Cli;
use ordertree::cli::handlers;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if cli.command.is_none() {
        // No subcommand → usage
        let _ = Cli::command().print_help();
        std::process::exit(2);
    }
    if let Err(e) = handlers::dispatch(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout stays clean for scripting
fn init_tracing() {
    let filter = EnvFilter::try_from_env("ORDERTREE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "ordertree=debug,info"
        } else {
            "ordertree=info,warn"
        })
    });

    let format = env::var("ORDERTREE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}
