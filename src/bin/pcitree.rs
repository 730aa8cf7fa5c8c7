//! Print the PCI hierarchy and AER health of a sysfs device tree.
//!
//! Run with: cargo run --bin pcitree -- --format table

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use pcitree::config::{ScanConfig, DEFAULT_SYSFS_ROOT};
use pcitree::{fixture, OutputFormat, Summary};

#[derive(Parser)]
#[command(name = "pcitree", version, about = "PCI topology and AER error summary")]
struct Cli {
    /// Directory with one subdirectory per PCI device
    #[arg(long, default_value = DEFAULT_SYSFS_ROOT)]
    root: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Tree)]
    format: OutputFormat,

    /// Exit 0 even when devices report AER errors
    #[arg(long)]
    no_fail: bool,

    /// Log defaulted attributes and topology decisions
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Write a synthetic two-domain device tree into DIR
    Fixture { dir: PathBuf },
}

fn scan(config: &ScanConfig, no_fail: bool) -> anyhow::Result<ExitCode> {
    let scan = pcitree::run_scan(&config.root)
        .with_context(|| format!("scanning {}", config.root.display()))?;
    let output = scan.render(config.format).context("rendering scan")?;
    print!("{}", output);

    if scan.all_summary() == Summary::Err && !no_fail {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Some(Command::Fixture { dir }) => fixture::write_fixture(&dir, &fixture::demo())
            .map(|_| {
                println!("wrote demo device tree to {}", dir.display());
                ExitCode::SUCCESS
            })
            .context("writing fixture"),
        None => {
            let config = ScanConfig {
                root: cli.root,
                format: cli.format,
            };
            scan(&config, cli.no_fail)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("pcitree: {:#}", e);
            ExitCode::from(2)
        }
    }
}
