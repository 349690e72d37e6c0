// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

mod commands;

use anyhow::Result;
use clap::Parser;

use commands::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.clone().init("linkfs-cli")?;
    cli.run().await
}
