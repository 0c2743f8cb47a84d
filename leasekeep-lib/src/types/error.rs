use serde::{Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

use crate::{ConsumerId, EndpointId};

/// Possible errors when interacting with `leasekeep_lib`
///
/// The variants fall into three families, which callers usually care about
/// more than the individual variant:
///
/// - *invalid argument*: the input was rejected before touching any state
///   (see [`ErrorKind::is_invalid_argument`])
/// - *not found*: a write referenced a record the ledger doesn't know
///   (see [`ErrorKind::is_not_found`])
/// - *conflict*: capacity was taken by another caller between lookup and
///   reservation, retrying may succeed (see [`ErrorKind::is_conflict`])
///
/// "No endpoint matched" is *not* an error. It is reported as `Ok(None)`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A lease was requested with a zero duration
    #[error("Lease duration must be greater than zero, got {0:?}")]
    InvalidDuration(Duration),

    /// Only one half of a latitude/longitude pair was given
    #[error("Latitude and longitude must be provided together")]
    IncompleteCoordinates,

    /// A search radius was given without a center point
    #[error("Latitude and longitude must be provided when a radius is set")]
    RadiusWithoutCoordinates,

    /// A search radius was zero, negative or not a number
    #[error("Search radius must be a positive number of kilometers, got {0}")]
    InvalidRadius(f64),

    /// The retry configuration is unusable
    #[error("Invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    /// The health check settings are unusable
    #[error("Invalid health check options: {0}")]
    InvalidHealthCheckOptions(String),

    /// An endpoint was configured with port 0
    #[error("Endpoint port must be between 1 and 65535")]
    InvalidPort,

    /// An endpoint was configured with a concurrency limit of 0
    #[error("Maximum concurrency must be greater than zero when set")]
    InvalidConcurrencyLimit,

    /// No pool with the given name or ID exists
    #[error("Pool `{0}` does not exist")]
    UnknownPool(String),

    /// No endpoint with the given ID exists
    #[error("Endpoint {0} does not exist")]
    UnknownEndpoint(EndpointId),

    /// No consumer with the given ID exists
    #[error("Consumer {0} does not exist")]
    UnknownConsumer(ConsumerId),

    /// The endpoint ran out of capacity after it was selected
    #[error("Endpoint {0} is no longer available")]
    CapacityExhausted(EndpointId),

    /// The HTTP client used for health checks could not be built
    #[error("Cannot build health check client for endpoint {endpoint}: {source}")]
    BuildProbeClient {
        /// The endpoint the client was meant for
        endpoint: EndpointId,
        /// The underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint's connection URL is not accepted as a proxy
    #[error("Endpoint {endpoint} has an unusable proxy URL: {source}")]
    InvalidProxyUrl {
        /// The endpoint that produced the URL
        endpoint: EndpointId,
        /// The underlying error
        #[source]
        source: reqwest::Error,
    },

    /// A seed file could not be parsed
    #[error("Cannot parse seed data: {0}")]
    SeedParse(#[from] toml::de::Error),

    /// A ledger call running on the blocking thread pool did not finish
    #[error("Background task failed: {0}")]
    BackgroundTask(#[from] tokio::task::JoinError),
}

impl ErrorKind {
    /// The request was rejected before any state change because the input
    /// itself is malformed
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidDuration(_)
                | Self::IncompleteCoordinates
                | Self::RadiusWithoutCoordinates
                | Self::InvalidRadius(_)
                | Self::InvalidRetryPolicy(_)
                | Self::InvalidHealthCheckOptions(_)
                | Self::InvalidPort
                | Self::InvalidConcurrencyLimit
        )
    }

    /// A write path referenced a record which doesn't exist
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownPool(_) | Self::UnknownEndpoint(_) | Self::UnknownConsumer(_)
        )
    }

    /// Capacity was taken between lookup and reservation
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::CapacityExhausted(_))
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidDuration(d1), Self::InvalidDuration(d2)) => d1 == d2,
            (Self::InvalidRadius(r1), Self::InvalidRadius(r2)) => {
                r1 == r2 || (r1.is_nan() && r2.is_nan())
            }
            (Self::InvalidRetryPolicy(m1), Self::InvalidRetryPolicy(m2))
            | (Self::InvalidHealthCheckOptions(m1), Self::InvalidHealthCheckOptions(m2))
            | (Self::UnknownPool(m1), Self::UnknownPool(m2)) => m1 == m2,
            (Self::UnknownEndpoint(e1), Self::UnknownEndpoint(e2))
            | (Self::CapacityExhausted(e1), Self::CapacityExhausted(e2)) => e1 == e2,
            (Self::UnknownConsumer(c1), Self::UnknownConsumer(c2)) => c1 == c2,
            (
                Self::BuildProbeClient {
                    endpoint: e1,
                    source: s1,
                },
                Self::BuildProbeClient {
                    endpoint: e2,
                    source: s2,
                },
            )
            | (
                Self::InvalidProxyUrl {
                    endpoint: e1,
                    source: s1,
                },
                Self::InvalidProxyUrl {
                    endpoint: e2,
                    source: s2,
                },
            ) => e1 == e2 && s1.to_string() == s2.to_string(),
            (Self::SeedParse(e1), Self::SeedParse(e2)) => e1.to_string() == e2.to_string(),
            (Self::BackgroundTask(e1), Self::BackgroundTask(e2)) => e1.id() == e2.id(),
            (Self::IncompleteCoordinates, Self::IncompleteCoordinates)
            | (Self::RadiusWithoutCoordinates, Self::RadiusWithoutCoordinates)
            | (Self::InvalidPort, Self::InvalidPort)
            | (Self::InvalidConcurrencyLimit, Self::InvalidConcurrencyLimit) => true,
            _ => false,
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
