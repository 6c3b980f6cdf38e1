// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

mod affinity;
mod chunk;
mod disk;
mod join;
mod network;
mod ring;
mod run;
mod signal;
mod stats;

use args::{CmdArgs, Parser};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    // clap reports usage problems on stderr and exits with status 2.
    let args = CmdArgs::parse();
    init_logging();

    match run::run(&args) {
        Ok(stats) => {
            println!("\n\n{stats}");
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
