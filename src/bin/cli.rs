// src/bin/cli.rs
use standings_sync::cli;

fn main() -> color_eyre::Result<()> {
    cli::run()
}
