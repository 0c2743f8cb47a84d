use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

use crate::{formatters, verbosity::Verbosity};

/// Initialize the logging system with the given verbosity level.
///
/// Log output goes to stderr so that stdout only carries command results.
pub(crate) fn init_logging(verbose: &Verbosity) {
    // Dependencies only log warnings unless RUST_LOG says otherwise
    let env = Env::default().filter_or("RUST_LOG", "warn");

    let mut builder = Builder::from_env(env);
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false);

    if std::env::var("RUST_LOG").is_err() {
        let level_filter = verbose.log_level_filter();

        builder.filter_level(LevelFilter::Warn);

        // `-v` and `-q` only change what our own crates log
        builder
            .filter_module("leasekeep", level_filter)
            .filter_module("leasekeep_lib", level_filter);
    }

    builder.format(move |buf, record| {
        let level = record.level();
        let color = formatters::color::color_for_level(level);
        writeln!(
            buf,
            "{} {}",
            color.apply_to(format!("[{level}]")),
            record.args()
        )
    });

    builder.init();
}
