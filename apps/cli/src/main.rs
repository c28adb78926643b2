//! DepoIndex CLI — deposition transcript analysis tool.
//!
//! Turns a page/line-structured transcript into a clustered table of
//! contents with export artifacts and a queryable topic index.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
