use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand, builder::TypedValueParser};
use const_format::{concatcp, formatcp};
use leasekeep_lib::health::HealthCheckOptions;
use leasekeep_lib::{LeaseConfig, RetryPolicy, Selector};
use serde::Deserialize;
use std::path::Path;
use std::{fs, path::PathBuf, str::FromStr, time::Duration};
use strum::{Display, EnumIter, VariantNames};

pub(crate) const LEASEKEEP_CONFIG_FILE: &str = "leasekeep.toml";

const DEFAULT_CHECK_CONCURRENCY: usize = 16;

// clap wants `&str` defaults, serde wants functions
const CHECK_CONCURRENCY_STR: &str = concatcp!(DEFAULT_CHECK_CONCURRENCY);

// Mention the default file in the help text while still being able to tell
// whether the user passed `--config` explicitly. Only an explicit file
// has to exist.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    LEASEKEEP_CONFIG_FILE,
);

/// How command results are written to stdout
#[derive(Debug, Deserialize, Default, Clone, Copy, Display, EnumIter, VariantNames, PartialEq, Eq)]
#[non_exhaustive]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum OutputFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_lowercase().as_str() {
            "compact" | "string" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!("Unknown format {format}")),
        }
    }
}

/// leasekeep hands out time-bounded leases on shared network endpoints.
///
/// The binary loads pools, endpoints and consumers from a seed file into an
/// in-memory ledger and runs one command against it.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct LeasekeepOptions {
    /// Configuration file to use
    #[arg(short, long = "config", global = true)]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,

    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Commands run against the seeded ledger
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub(crate) enum Command {
    /// Show capacity figures of one pool, or of every seeded pool
    Stats(StatsArgs),

    /// Lease endpoints out of a pool and print the leases.
    ///
    /// The leases are released again before the program exits.
    Acquire(AcquireArgs),

    /// Probe every endpoint of a pool and print the outcome
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub(crate) struct StatsArgs {
    /// Pool to report on (all seeded pools if omitted)
    pub(crate) pool: Option<String>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub(crate) struct AcquireArgs {
    /// Pool to lease from
    pub(crate) pool: String,

    /// Consumer charged with the leases
    #[arg(long)]
    pub(crate) consumer: Option<String>,

    /// How long each lease lasts, e.g. `90s` or `5m`
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) duration: Option<Duration>,

    /// How to pick among eligible endpoints
    #[arg(long, default_value = "first_eligible", value_parser = PossibleValuesParser::new(Selector::VARIANTS).map(|s| s.parse::<Selector>().unwrap()))]
    pub(crate) selector: Selector,

    /// Only lease endpoints located in one of these countries
    #[arg(long)]
    pub(crate) country: Vec<String>,

    /// Number of leases to take out
    #[arg(short = 'n', long, default_value = "1")]
    pub(crate) count: usize,

    /// Attempts per lease when the pool is exhausted.
    /// Overrides `max_attempts` of the `[retry]` config section.
    #[arg(long)]
    pub(crate) retries: Option<u32>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub(crate) struct CheckArgs {
    /// Pool whose endpoints get probed
    pub(crate) pool: String,
}

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    check_concurrency: usize = DEFAULT_CHECK_CONCURRENCY;
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Options shared by all commands. Everything here can also be set in the
/// configuration file; command-line values take precedence.
#[derive(Parser, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Seed file with the pools, endpoints and consumers to load
    #[arg(short, long, global = true)]
    #[serde(default)]
    pub(crate) seed: Option<PathBuf>,

    /// Output format of command results
    #[arg(short, long, global = true, default_value = "compact", value_parser = PossibleValuesParser::new(OutputFormat::VARIANTS).map(|s| s.parse::<OutputFormat>().unwrap()))]
    #[serde(default)]
    pub(crate) format: OutputFormat,

    /// Maximum number of endpoints probed at the same time
    #[arg(long, global = true, default_value = &CHECK_CONCURRENCY_STR)]
    #[serde(default = "check_concurrency")]
    pub(crate) check_concurrency: usize,

    /// Lease defaults (config file only)
    #[arg(skip)]
    #[serde(default)]
    pub(crate) lease: LeaseConfig,

    /// Retry policy for `acquire` (config file only)
    #[arg(skip)]
    #[serde(default)]
    pub(crate) retry: RetryPolicy,

    /// Health check settings for `check` (config file only)
    #[arg(skip)]
    #[serde(default)]
    pub(crate) health: HealthCheckOptions,
}

impl Config {
    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        // These sections have no command-line counterpart
        self.lease = toml.lease;
        self.retry = toml.retry;
        self.health = toml.health;

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..lease,
                ..retry,
                ..health,

                // Keys with defaults to assign
                check_concurrency: DEFAULT_CHECK_CONCURRENCY,
                format: OutputFormat::default(),
                seed: None,
                verbose: Verbosity::default(),
            }
        }
    }
}
