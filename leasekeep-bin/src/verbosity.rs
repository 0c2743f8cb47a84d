//! Counted `-v` / `-q` flags, shared by every subcommand.
//!
//! Without flags only `info` and above is shown for the leasekeep crates:
//! - `-q` hides info messages, `-qq` warnings as well
//! - `-v` shows debug messages, `-vv` trace messages

use log::{Level, LevelFilter};
use serde::Deserialize;
use std::fmt;

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Verbosity {
    /// More log output per occurrence
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet",
    )]
    verbose: u8,

    /// Less log output per occurrence
    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "verbose",
    )]
    quiet: u8,
}

impl Verbosity {
    /// The most detailed level that gets logged
    pub(crate) const fn log_level(&self) -> Level {
        level_enum(self.verbosity())
    }

    pub(crate) fn log_level_filter(&self) -> LevelFilter {
        self.log_level().to_level_filter()
    }

    #[allow(clippy::cast_possible_wrap)]
    const fn verbosity(&self) -> i8 {
        level_value(Level::Info) - (self.quiet as i8) + (self.verbose as i8)
    }
}

// A config file names the level directly, e.g. `verbose = "debug"`
impl<'de> Deserialize<'de> for Verbosity {
    #[allow(clippy::cast_sign_loss)]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let level = match s.to_lowercase().as_str() {
            "error" => Level::Error,
            "warn" | "warning" => Level::Warn,
            "info" => Level::Info,
            "debug" => Level::Debug,
            "trace" => Level::Trace,
            level => {
                return Err(serde::de::Error::custom(format!(
                    "invalid log level `{level}`"
                )));
            }
        };

        let offset = level_value(level) - level_value(Level::Info);
        Ok(Verbosity {
            verbose: offset.max(0) as u8,
            quiet: (-offset).max(0) as u8,
        })
    }
}

const fn level_value(level: Level) -> i8 {
    match level {
        Level::Error => 0,
        Level::Warn => 1,
        Level::Info => 2,
        Level::Debug => 3,
        Level::Trace => 4,
    }
}

const fn level_enum(verbosity: i8) -> Level {
    match verbosity {
        i8::MIN..=0 => Level::Error,
        1 => Level::Warn,
        2 => Level::Info,
        3 => Level::Debug,
        _ => Level::Trace,
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rstest::rstest;

    #[derive(Debug, Parser)]
    struct Cli {
        #[clap(flatten)]
        verbose: Verbosity,
    }

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&[], Level::Info)]
    #[case(&["-v"], Level::Debug)]
    #[case(&["-vvvv"], Level::Trace)]
    #[case(&["-q"], Level::Warn)]
    #[case(&["-qqq"], Level::Error)]
    fn test_counted_flags(#[case] flags: &[&str], #[case] expected: Level) {
        let cli = Cli::parse_from(std::iter::once("leasekeep").chain(flags.iter().copied()));
        assert_eq!(cli.verbose.log_level(), expected);
    }

    #[rstest]
    #[case("error", Level::Error)]
    #[case("Warning", Level::Warn)]
    #[case("info", Level::Info)]
    #[case("trace", Level::Trace)]
    fn test_deserialize(#[case] name: &str, #[case] expected: Level) {
        let verbosity: Verbosity = serde_json::from_value(serde_json::json!(name)).unwrap();
        assert_eq!(verbosity.log_level(), expected);
    }

    #[test]
    fn test_deserialize_unknown_level() {
        assert!(serde_json::from_value::<Verbosity>(serde_json::json!("loud")).is_err());
    }
}
