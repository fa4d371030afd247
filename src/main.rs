#![forbid(unsafe_code)]

//! qc-crawl — QC asset crawler CLI entry point.

use clap::Parser;

use qc_asset_crawler::core::errors::QcError;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("qc-crawl: {e}");
        let code = if matches!(e, QcError::Interrupted) { 2 } else { 1 };
        std::process::exit(code);
    }
}
