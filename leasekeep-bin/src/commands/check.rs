use anyhow::Result;
use leasekeep_lib::health::HealthChecker;
use leasekeep_lib::storage::Storage;

use super::CommandParams;
use crate::ExitCode;
use crate::formatters::HealthReport;
use crate::options::CheckArgs;

/// Probe every endpoint of a pool and print the results, ordered by
/// endpoint address
pub(crate) async fn check(params: &CommandParams, args: &CheckArgs) -> Result<ExitCode> {
    params.pool(&args.pool)?;

    let checker = HealthChecker::new(params.storage.clone(), params.cfg.health.clone())?
        .with_concurrency(params.cfg.check_concurrency);

    let mut reports: Vec<_> = checker
        .check_pool(&args.pool)
        .await
        .into_iter()
        .map(|result| {
            let endpoint = params.storage.endpoint(result.endpoint_id);
            HealthReport::new(result, endpoint.as_ref())
        })
        .collect();
    reports.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));

    print!("{}", params.formatter.format_health(&reports)?);
    Ok(ExitCode::Success)
}
