// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use log::{debug, error, info, LevelFilter};
use mdraid::{mdstat, tables, Backend, Kernel};

#[derive(Parser, Debug)]
#[command(name = "mdstat-report", about = "Report Linux software RAID status", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Root directory to read proc and sys from
    #[arg(long, default_value = "/")]
    sysroot: PathBuf,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// One row per array
    Devices,
    /// One row per array slot
    Drives,
    /// Loaded RAID personalities
    Personalities,
    /// Devices, drives and personalities in one document
    All,
    /// Plain text health overview, one line per array
    Summary,
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

/// Prints one line per array with its per-slot health
fn print_summary(backend: &Kernel) {
    let status = match backend.read_mdstat() {
        Ok(text) => mdstat::parse(&text),
        Err(e) => {
            error!("Unable to read mdstat: {}", e);
            return;
        }
    };
    for array in &status.arrays {
        let health = array
            .slot_health()
            .iter()
            .map(|up| if *up { 'U' } else { '_' })
            .collect::<String>();
        let verdict = if array.is_degraded() { "degraded" } else { "ok" };
        println!(
            "{} {} {} [{}] {}",
            array.name, array.raid_level, array.status, health, verdict
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log_level(cli.verbose))
        .parse_default_env()
        .init();

    let backend = Kernel::with_sysroot(cli.sysroot.clone());
    let command = cli.command.unwrap_or(Command::All);
    info!("Collecting md status ({:?}) from {:?}", command, backend.sysroot());

    let document = match command {
        Command::Devices => serde_json::to_value(tables::md_devices(&backend))?,
        Command::Drives => serde_json::to_value(tables::md_drives(&backend))?,
        Command::Personalities => serde_json::to_value(tables::md_personalities(&backend))?,
        Command::All => serde_json::to_value(tables::report(&backend))?,
        Command::Summary => {
            print_summary(&backend);
            return Ok(());
        }
    };

    let output = if cli.pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    debug!("Serialized {} bytes", output.len());
    println!("{output}");

    Ok(())
}
