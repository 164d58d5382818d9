//! YouMind CLI — ask questions against YouMind boards from the terminal.
//!
//! Drives a real browser session per question, maintains a local library of
//! known boards, and auto-discovers board metadata.

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
