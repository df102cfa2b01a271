use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

mod cli;

use crate::cli::{Cli, SubCommand};
use ftrace::helpers::logger::Logger;

fn main() -> Result<()> {
    let cli = Cli::parse();

    Logger::init(LevelFilter::from_str(&cli.main_config.log_level)?)?;
    let paths = cli.main_config.paths()?;

    match cli.command {
        SubCommand::Probe(cmd) => cmd.run(paths),
        SubCommand::Status(cmd) => cmd.run(paths),
    }
}
