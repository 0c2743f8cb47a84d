use anyhow::Result;
use leasekeep_lib::storage::Storage;

use super::CommandParams;
use crate::ExitCode;
use crate::options::StatsArgs;

/// Print capacity figures for the requested pool, or for all seeded pools
pub(crate) fn stats(params: &CommandParams, args: &StatsArgs) -> Result<ExitCode> {
    let names = match &args.pool {
        Some(pool) => vec![params.pool(pool)?.name],
        None => params.pools.clone(),
    };

    let stats: Vec<_> = names
        .iter()
        .filter_map(|name| params.storage.pool_stats(name))
        .collect();

    print!("{}", params.formatter.format_stats(&stats)?);
    Ok(ExitCode::Success)
}
