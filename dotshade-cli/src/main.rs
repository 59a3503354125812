mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })?;

    let cli = Cli::parse();

    // dotshade warnings on stderr unless --json; each -v raises the level; RUST_LOG overrides
    if !cli.global.json {
        let level = match cli.global.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        env_logger::Builder::new()
            .filter_module("dotshade", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Graph {
            assets,
            framework,
            package,
        } => commands::graph::run(assets, framework.as_deref(), package.as_deref(), &cli.global),
        Command::Plan { args } => commands::plan::run(args, &cli.global),
        Command::Shade { args } => commands::shade::run(args, &cli.global),
        Command::Keygen { out } => commands::keygen::run(out, &cli.global),
    }
}
