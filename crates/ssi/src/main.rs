//! SSI CLI - directive renderer.
//!
//! Provides commands for:
//! - `render`: Render one document and write the result to a file or stdout

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use commands::RenderArgs;
use output::Output;

/// SSI - asynchronous server-side include renderer.
#[derive(Parser)]
#[command(name = "ssi", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a document.
    Render(RenderArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = matches!(&cli.command, Commands::Render(args) if args.verbose);

    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, env.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    // Inserts share one task, so a current-thread runtime is enough.
    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(error::CliError::from)
        .and_then(|rt| match cli.command {
            Commands::Render(args) => rt.block_on(args.execute()),
        });

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

/// Log filter: `--verbose` enables DEBUG, otherwise `RUST_LOG` or WARN.
fn log_filter(verbose: bool, env: Option<&str>) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(env.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_defaults_to_warn() {
        assert_eq!(log_filter(false, None).to_string(), "warn");
        assert_eq!(log_filter(false, Some("")).to_string(), "warn");
    }

    #[test]
    fn test_log_filter_verbose_and_env() {
        assert_eq!(log_filter(true, Some("error")).to_string(), "debug");
        let filter = log_filter(false, Some("ssi_engine=trace")).to_string();
        assert!(filter.contains("ssi_engine=trace"));
    }
}
