//! This file defines the metafold binary entry point.

use metafold::app;
use metafold::cli;
use metafold::error;
use metafold::tracing;

use std::process::exit;

/// Application entry point
#[tokio::main]
async fn main() {
    let args = cli::parse();
    tracing::init_tracing();
    if let Err(err) = app::run(&args).await {
        error::log_error(&err);
        exit(1);
    }
}
