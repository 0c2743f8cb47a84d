//! `leasekeep` hands out time-bounded leases on shared network endpoints,
//! such as proxies, grouped into named pools.
//!
//! The binary is a thin wrapper around leasekeep-lib. It loads a seed file
//! into an in-memory ledger and runs one command against it.
//!
//! Show how many endpoints of each pool can take another lease:
//! ```sh
//! leasekeep --seed pools.toml stats
//! ```
//!
//! Lease two endpoints located in Argentina or Chile:
//! ```sh
//! leasekeep --seed pools.toml acquire residential -n 2 --country AR --country CL
//! ```
//!
//! Probe every endpoint of a pool and print the results as JSON:
//! ```sh
//! leasekeep --seed pools.toml --format json check residential
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, crate_version};
use log::{error, warn};

use leasekeep_lib::bootstrap::SeedConfig;
use leasekeep_lib::storage::InMemoryStorage;
#[cfg(feature = "native-tls")]
use openssl_sys as _; // required for vendored-openssl feature

mod commands;
mod formatters;
mod options;
mod verbosity;

use crate::commands::CommandParams;
use crate::formatters::{get_formatter, log::init_logging};
use crate::options::{Command, Config, LEASEKEEP_CONFIG_FILE, LeasekeepOptions};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator, which covers unknown pools and bad seed files.
    #[allow(unused)]
    UnexpectedFailure = 1,
    NoLease = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    // See: https://doc.rust-lang.org/stable/std/process/fn.exit.html
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file and command-line arguments.
fn load_config() -> Result<LeasekeepOptions> {
    let mut opts = LeasekeepOptions::parse();

    init_logging(&opts.config.verbose);

    // Load a potentially existing config file and merge it into the config from
    // the CLI
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // Without `--config`, the default file is only read if it exists.
        // It still has to be valid if it does.
        let default_config = PathBuf::from(LEASEKEEP_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    Ok(opts)
}

/// Set up runtime and run the requested command
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config (leasekeep {}): {e}", crate_version!());
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let exit_code = runtime.block_on(run(opts))?;
    Ok(exit_code as i32)
}

/// Register the contents of the seed file and return the pool names in
/// the order they appear in the file
fn load_seed(cfg: &Config, storage: &InMemoryStorage) -> Result<Vec<String>> {
    let Some(path) = &cfg.seed else {
        warn!("No seed file given, the ledger is empty");
        return Ok(Vec::new());
    };

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Cannot read seed file `{}`", path.display()))?;
    let seed = SeedConfig::from_toml(&contents)
        .with_context(|| format!("Cannot parse seed file `{}`", path.display()))?;

    let mut pools: Vec<String> = Vec::new();
    for pool in &seed.pools {
        if !pools.contains(&pool.name) {
            pools.push(pool.name.clone());
        }
    }

    seed.apply(storage)
        .with_context(|| format!("Cannot register seed file `{}`", path.display()))?;
    Ok(pools)
}

async fn run(opts: LeasekeepOptions) -> Result<ExitCode> {
    let storage = Arc::new(InMemoryStorage::new());
    let pools = load_seed(&opts.config, &storage)?;

    let params = CommandParams {
        storage,
        pools,
        formatter: get_formatter(opts.config.format),
        cfg: opts.config,
    };

    match &opts.command {
        Command::Stats(args) => commands::stats(&params, args),
        Command::Acquire(args) => commands::acquire(&params, args).await,
        Command::Check(args) => commands::check(&params, args).await,
    }
}
