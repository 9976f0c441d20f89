#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `mixer`: plan, check and execute perfume recipes on pump nodes.

mod cli;
mod commands;
mod error_fmt;
mod logging;
mod run;

use clap::Parser;
use eyre::Result;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::commands::Ctx;
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    // Only the panic/report hooks are wanted; a second install is harmless to skip.
    let _ = color_eyre::install();

    let code = match real_main(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&err));
            } else {
                eprintln!("{}", humanize(&err));
            }
            exit_code_for_error(&err)
        }
    };
    std::process::exit(code);
}

fn real_main(cli: Cli) -> Result<i32> {
    let cfg = commands::load_config(cli.config.as_deref())?;
    logging::init(cli.log_level.as_deref(), cli.json, &cfg.logging)?;
    tracing::debug!(config = ?cli.config, inventory = ?cli.inventory, "starting");

    let ctx = Ctx::new(cfg, cli.json, cli.inventory, cli.calibration);
    match &cli.cmd {
        Commands::Plan(target) => commands::plan(&ctx, target),
        Commands::Estimate(target) => commands::estimate(&ctx, target),
        Commands::CheckStock(target) => commands::check_stock(&ctx, target),
        Commands::MaxBatch { recipe, lines } => commands::max_batch(&ctx, recipe, lines),
        Commands::Run { target, mode, link } => run::run_recipe(&ctx, target, (*mode).into(), link),
        Commands::Pulse {
            slave,
            pin,
            ms,
            link,
        } => commands::pulse(&ctx, *slave, pin, *ms, link),
        Commands::Audit => commands::audit_inventory(&ctx),
        Commands::SelfCheck => commands::self_check(&ctx),
    }
}
