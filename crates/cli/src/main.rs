//! CLI entry point for the file store.

use clap::Parser;
use cli::CliConfig;

fn main() -> anyhow::Result<()> {
    CliConfig::parse().run()
}
