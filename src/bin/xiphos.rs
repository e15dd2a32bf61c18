//! Xiphos CLI binary.

use std::io::Write;
use std::process;

use anyhow::Context;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

use xiphos::cli::args::*;
use xiphos::cli::commands::*;

fn run(args: XiphosArgs) -> anyhow::Result<()> {
    let name = match &args.command {
        Command::Train(_) => "train",
        Command::CrossValidate(_) => "cross-validate",
        Command::Search(_) => "search",
    };
    execute_command(args).with_context(|| format!("{name} failed"))
}

fn main() {
    let args = XiphosArgs::parse();

    let log_level = match args.verbosity() {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
