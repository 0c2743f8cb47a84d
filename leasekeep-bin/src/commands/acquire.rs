use std::sync::Arc;

use anyhow::{Context, Result};
use leasekeep_lib::storage::Storage;
use leasekeep_lib::{AcquireRequest, AsyncLeaseManager, Filter, LeaseManager, LogObserver};
use log::{info, warn};

use super::CommandParams;
use crate::ExitCode;
use crate::formatters::LeaseReport;
use crate::options::AcquireArgs;

/// Take out `--count` leases, print them and release them again.
///
/// Exits with [`ExitCode::NoLease`] if the pool ran out before all leases
/// were taken.
pub(crate) async fn acquire(params: &CommandParams, args: &AcquireArgs) -> Result<ExitCode> {
    params.pool(&args.pool)?;

    let manager: AsyncLeaseManager = LeaseManager::new(params.storage.clone())
        .with_config(params.cfg.lease.clone())
        .with_observer(Arc::new(LogObserver))
        .into();

    let request = AcquireRequest {
        pool: args.pool.clone(),
        consumer: args.consumer.clone(),
        duration: args.duration,
        filter: country_filter(&args.country)?,
        selector: args.selector,
    };

    let mut policy = params.cfg.retry.clone();
    if let Some(retries) = args.retries {
        policy.max_attempts = retries;
    }

    let mut leases = Vec::with_capacity(args.count);
    for _ in 0..args.count {
        match manager.acquire_with_retry(request.clone(), &policy).await? {
            Some(lease) => leases.push(lease),
            None => {
                warn!(
                    "No eligible endpoint left in pool `{}` after {} lease(s)",
                    args.pool,
                    leases.len()
                );
                break;
            }
        }
    }

    let reports: Vec<_> = leases
        .iter()
        .map(|lease| {
            let endpoint = params.storage.endpoint(lease.endpoint_id);
            LeaseReport::new(lease.clone(), endpoint.as_ref())
        })
        .collect();
    print!("{}", params.formatter.format_leases(&reports)?);

    for lease in leases {
        manager
            .release(lease)
            .await
            .context("Cannot release lease")?;
    }
    info!("Released {} lease(s)", reports.len());

    if reports.len() < args.count {
        return Ok(ExitCode::NoLease);
    }
    Ok(ExitCode::Success)
}

/// Match endpoints located in any of `countries` (everything if empty)
fn country_filter(countries: &[String]) -> Result<Filter> {
    let filter = match countries {
        [] => Filter::default(),
        [country] => Filter::builder().country(country).build()?,
        countries => {
            let any_of = countries
                .iter()
                .map(|country| Filter::builder().country(country).build())
                .collect::<Result<Vec<_>, _>>()?;
            Filter::builder().any_of(any_of).build()?
        }
    };
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leasekeep_lib::{Endpoint, EndpointStatus, PoolId};

    fn located(country: &str) -> Endpoint {
        let mut endpoint = Endpoint::builder()
            .pool_id(PoolId::new())
            .host("10.0.0.1")
            .port(8080)
            .status(EndpointStatus::Active)
            .build();
        endpoint.country = Some(country.to_string());
        endpoint
    }

    #[test]
    fn test_country_filter() {
        assert!(country_filter(&[]).unwrap().is_empty());

        let single = country_filter(&["AR".into()]).unwrap();
        assert!(single.matches(&located("AR")));
        assert!(!single.matches(&located("CL")));

        let several = country_filter(&["AR".into(), "CL".into()]).unwrap();
        assert!(several.matches(&located("AR")));
        assert!(several.matches(&located("CL")));
        assert!(!several.matches(&located("BR")));
    }
}
