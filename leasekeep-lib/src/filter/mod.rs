//! Attribute filters used to narrow down which endpoints may be leased.
//!
//! A [`Filter`] is a tree: a node holds scalar constraints (exact tag
//! matches and an optional geographic constraint), an optional opaque
//! predicate, and three lists of child filters combined as
//! `all_of` (AND), `any_of` (OR) and `none_of` (NOT).
//!
//! Filters are validated once, when they are built, and are pure afterwards.
//!
//! ```
//! use leasekeep_lib::Filter;
//!
//! # fn main() -> leasekeep_lib::Result<()> {
//! // Argentinian endpoints within 50km of Buenos Aires, but not from ISP "acme"
//! let filter = Filter::builder()
//!     .country("AR")
//!     .latitude(-34.6)
//!     .longitude(-58.38)
//!     .radius_km(50.0)
//!     .none_of([Filter::builder().isp("acme").build()?])
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod geo;

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

pub use geo::{EARTH_RADIUS_KM, GeoConstraint, GeoPoint};

use crate::{Endpoint, Result};

/// An opaque, caller-supplied condition on an endpoint
pub type Predicate = Arc<dyn Fn(&Endpoint) -> bool + Send + Sync>;

/// A validated boolean expression over endpoint attributes.
///
/// The default filter has no constraints and matches every endpoint.
#[derive(Clone, Default)]
pub struct Filter {
    source: Option<String>,
    country: Option<String>,
    city: Option<String>,
    isp: Option<String>,
    asn: Option<u32>,
    geo: Option<GeoConstraint>,
    all_of: Vec<Filter>,
    any_of: Vec<Filter>,
    none_of: Vec<Filter>,
    predicate: Option<Predicate>,
}

impl Filter {
    /// Start building a filter
    #[must_use]
    pub fn builder() -> FilterBuilder {
        FilterBuilder::default()
    }

    /// Whether the endpoint satisfies every condition of this filter.
    ///
    /// Evaluation order: scalar constraints, predicate, `all_of`, `any_of`,
    /// `none_of`. The first failing condition ends the evaluation.
    #[must_use]
    pub fn matches(&self, endpoint: &Endpoint) -> bool {
        if !self.matches_scalars(endpoint) {
            return false;
        }
        if let Some(predicate) = &self.predicate {
            if !predicate(endpoint) {
                return false;
            }
        }
        if !self.all_of.iter().all(|child| child.matches(endpoint)) {
            return false;
        }
        if !self.any_of.is_empty() && !self.any_of.iter().any(|child| child.matches(endpoint)) {
            return false;
        }
        !self.none_of.iter().any(|child| child.matches(endpoint))
    }

    /// Whether this filter, or any nested filter, carries an opaque
    /// predicate.
    ///
    /// Backends that translate filters into a query language cannot push
    /// such filters down and must evaluate them in-process instead.
    #[must_use]
    pub fn requires_predicate(&self) -> bool {
        self.predicate.is_some() || self.children().any(Self::requires_predicate)
    }

    /// Whether this filter has no constraints at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.country.is_none()
            && self.city.is_none()
            && self.isp.is_none()
            && self.asn.is_none()
            && self.geo.is_none()
            && self.predicate.is_none()
            && self.children().next().is_none()
    }

    /// Required country tag
    #[must_use]
    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// Required city tag
    #[must_use]
    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    /// Required ISP tag
    #[must_use]
    pub fn isp(&self) -> Option<&str> {
        self.isp.as_deref()
    }

    /// Required source tag
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Required autonomous system number
    #[must_use]
    pub const fn asn(&self) -> Option<u32> {
        self.asn
    }

    /// Geographic constraint
    #[must_use]
    pub const fn geo(&self) -> Option<&GeoConstraint> {
        self.geo.as_ref()
    }

    fn children(&self) -> impl Iterator<Item = &Filter> {
        self.all_of
            .iter()
            .chain(self.any_of.iter())
            .chain(self.none_of.iter())
    }

    fn matches_scalars(&self, endpoint: &Endpoint) -> bool {
        fn tag_matches(wanted: Option<&String>, actual: Option<&String>) -> bool {
            wanted.is_none_or(|wanted| actual == Some(wanted))
        }

        tag_matches(self.source.as_ref(), endpoint.source.as_ref())
            && tag_matches(self.country.as_ref(), endpoint.country.as_ref())
            && tag_matches(self.city.as_ref(), endpoint.city.as_ref())
            && tag_matches(self.isp.as_ref(), endpoint.isp.as_ref())
            && self.asn.is_none_or(|asn| endpoint.asn == Some(asn))
            && self.geo.as_ref().is_none_or(|geo| geo.matches(endpoint))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Filter");
        if let Some(source) = &self.source {
            s.field("source", source);
        }
        if let Some(country) = &self.country {
            s.field("country", country);
        }
        if let Some(city) = &self.city {
            s.field("city", city);
        }
        if let Some(isp) = &self.isp {
            s.field("isp", isp);
        }
        if let Some(asn) = &self.asn {
            s.field("asn", asn);
        }
        if let Some(geo) = &self.geo {
            s.field("geo", geo);
        }
        if !self.all_of.is_empty() {
            s.field("all_of", &self.all_of);
        }
        if !self.any_of.is_empty() {
            s.field("any_of", &self.any_of);
        }
        if !self.none_of.is_empty() {
            s.field("none_of", &self.none_of);
        }
        if self.predicate.is_some() {
            s.field("predicate", &"<fn>");
        }
        s.finish()
    }
}

/// Builder for [`Filter`]. Validation happens in [`FilterBuilder::build`].
#[derive(Default)]
pub struct FilterBuilder {
    source: Option<String>,
    country: Option<String>,
    city: Option<String>,
    isp: Option<String>,
    asn: Option<u32>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    radius_km: Option<f64>,
    all_of: Vec<Filter>,
    any_of: Vec<Filter>,
    none_of: Vec<Filter>,
    predicate: Option<Predicate>,
}

impl FilterBuilder {
    /// Require this source tag
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Require this country tag
    #[must_use]
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Require this city tag
    #[must_use]
    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Require this ISP tag
    #[must_use]
    pub fn isp(mut self, isp: impl Into<String>) -> Self {
        self.isp = Some(isp.into());
        self
    }

    /// Require this autonomous system number
    #[must_use]
    pub const fn asn(mut self, asn: u32) -> Self {
        self.asn = Some(asn);
        self
    }

    /// Latitude of the geographic center
    #[must_use]
    pub const fn latitude(mut self, latitude: f64) -> Self {
        self.latitude = Some(latitude);
        self
    }

    /// Longitude of the geographic center
    #[must_use]
    pub const fn longitude(mut self, longitude: f64) -> Self {
        self.longitude = Some(longitude);
        self
    }

    /// Search radius around the center, in kilometers
    #[must_use]
    pub const fn radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = Some(radius_km);
        self
    }

    /// Every one of these filters must match
    #[must_use]
    pub fn all_of(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.all_of.extend(filters);
        self
    }

    /// At least one of these filters must match
    #[must_use]
    pub fn any_of(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.any_of.extend(filters);
        self
    }

    /// None of these filters may match
    #[must_use]
    pub fn none_of(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.none_of.extend(filters);
        self
    }

    /// An arbitrary extra condition
    #[must_use]
    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Endpoint) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Validate and build the filter
    ///
    /// # Errors
    ///
    /// Returns an error if the geographic inputs are inconsistent, see
    /// [`GeoConstraint::from_parts`].
    pub fn build(self) -> Result<Filter> {
        let geo = GeoConstraint::from_parts(self.latitude, self.longitude, self.radius_km)?;
        Ok(Filter {
            source: self.source,
            country: self.country,
            city: self.city,
            isp: self.isp,
            asn: self.asn,
            geo,
            all_of: self.all_of,
            any_of: self.any_of,
            none_of: self.none_of,
            predicate: self.predicate,
        })
    }
}

/// Serializable description of a [`Filter`], as found in configuration
/// files. Converting it into a [`Filter`] runs the same validation as the
/// builder. Predicates cannot be expressed here.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Required source tag
    pub source: Option<String>,
    /// Required country tag
    pub country: Option<String>,
    /// Required city tag
    pub city: Option<String>,
    /// Required ISP tag
    pub isp: Option<String>,
    /// Required autonomous system number
    pub asn: Option<u32>,
    /// Latitude of the geographic center
    pub latitude: Option<f64>,
    /// Longitude of the geographic center
    pub longitude: Option<f64>,
    /// Search radius in kilometers
    pub radius_km: Option<f64>,
    /// Nested filters which must all match
    #[serde(default)]
    pub all_of: Vec<FilterConfig>,
    /// Nested filters of which one must match
    #[serde(default)]
    pub any_of: Vec<FilterConfig>,
    /// Nested filters which must not match
    #[serde(default)]
    pub none_of: Vec<FilterConfig>,
}

impl TryFrom<FilterConfig> for Filter {
    type Error = crate::ErrorKind;

    fn try_from(config: FilterConfig) -> Result<Self> {
        fn convert(children: Vec<FilterConfig>) -> Result<Vec<Filter>> {
            children.into_iter().map(Filter::try_from).collect()
        }

        FilterBuilder {
            source: config.source,
            country: config.country,
            city: config.city,
            isp: config.isp,
            asn: config.asn,
            latitude: config.latitude,
            longitude: config.longitude,
            radius_km: config.radius_km,
            all_of: convert(config.all_of)?,
            any_of: convert(config.any_of)?,
            none_of: convert(config.none_of)?,
            predicate: None,
        }
        .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::endpoint;
    use crate::{EndpointStatus, ErrorKind};

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&endpoint()));
    }

    #[test]
    fn test_scalar_constraints_are_exact() {
        let mut e = endpoint();
        e.country = Some("AR".into());
        e.asn = Some(7303);

        let filter = Filter::builder().country("AR").asn(7303).build().unwrap();
        assert!(filter.matches(&e));

        // Case-sensitive
        let filter = Filter::builder().country("ar").build().unwrap();
        assert!(!filter.matches(&e));

        let filter = Filter::builder().asn(7304).build().unwrap();
        assert!(!filter.matches(&e));

        // Missing tags never match a required value
        let filter = Filter::builder().city("Rosario").build().unwrap();
        assert!(!filter.matches(&e));
    }

    #[test]
    fn test_latitude_without_longitude_is_rejected() {
        let err = Filter::builder().latitude(1.0).build().unwrap_err();
        assert_eq!(err, ErrorKind::IncompleteCoordinates);
        assert!(err.is_invalid_argument());

        let err = Filter::builder().longitude(1.0).build().unwrap_err();
        assert_eq!(err, ErrorKind::IncompleteCoordinates);
    }

    #[test]
    fn test_radius_without_coordinates_is_rejected() {
        let err = Filter::builder().radius_km(10.0).build().unwrap_err();
        assert_eq!(err, ErrorKind::RadiusWithoutCoordinates);
    }

    #[test]
    fn test_non_positive_radius_is_rejected() {
        let err = Filter::builder()
            .latitude(1.0)
            .longitude(1.0)
            .radius_km(-3.0)
            .build()
            .unwrap_err();
        assert_eq!(err, ErrorKind::InvalidRadius(-3.0));
    }

    #[test]
    fn test_geo_radius() {
        let mut buenos_aires = endpoint();
        buenos_aires.latitude = Some(-34.6037);
        buenos_aires.longitude = Some(-58.3816);
        let mut santiago = endpoint();
        santiago.latitude = Some(-33.4489);
        santiago.longitude = Some(-70.6693);
        let nowhere = endpoint();

        let filter = Filter::builder()
            .latitude(-34.6)
            .longitude(-58.38)
            .radius_km(50.0)
            .build()
            .unwrap();

        assert!(filter.matches(&buenos_aires));
        assert!(!filter.matches(&santiago));
        assert!(!filter.matches(&nowhere));
    }

    #[test]
    fn test_geo_without_radius_requires_same_spot() {
        let mut e = endpoint();
        e.latitude = Some(-34.6037);
        e.longitude = Some(-58.3816);

        let exact = Filter::builder()
            .latitude(-34.6037)
            .longitude(-58.3816)
            .build()
            .unwrap();
        let close = Filter::builder()
            .latitude(-34.6)
            .longitude(-58.38)
            .build()
            .unwrap();

        assert!(exact.matches(&e));
        assert!(!close.matches(&e));
    }

    #[test]
    fn test_combinators() {
        let mut e = endpoint();
        e.country = Some("BR".into());
        e.isp = Some("vivo".into());

        let country = |c: &str| Filter::builder().country(c).build().unwrap();
        let isp = |i: &str| Filter::builder().isp(i).build().unwrap();

        let any = Filter::builder()
            .any_of([country("AR"), country("BR")])
            .build()
            .unwrap();
        assert!(any.matches(&e));

        let any_miss = Filter::builder()
            .any_of([country("AR"), country("CL")])
            .build()
            .unwrap();
        assert!(!any_miss.matches(&e));

        let all = Filter::builder()
            .all_of([country("BR"), isp("vivo")])
            .build()
            .unwrap();
        assert!(all.matches(&e));

        let all_miss = Filter::builder()
            .all_of([country("BR"), isp("claro")])
            .build()
            .unwrap();
        assert!(!all_miss.matches(&e));

        let none = Filter::builder().none_of([isp("vivo")]).build().unwrap();
        assert!(!none.matches(&e));

        let none_ok = Filter::builder().none_of([isp("claro")]).build().unwrap();
        assert!(none_ok.matches(&e));
    }

    #[test]
    fn test_predicate() {
        let mut e = endpoint();
        e.port = 1080;

        let filter = Filter::builder()
            .predicate(|endpoint| endpoint.port == 1080)
            .build()
            .unwrap();
        assert!(filter.matches(&e));
        assert!(filter.requires_predicate());

        let nested = Filter::builder()
            .none_of([Filter::builder()
                .predicate(|endpoint| endpoint.status == EndpointStatus::Slow)
                .build()
                .unwrap()])
            .build()
            .unwrap();
        assert!(nested.requires_predicate());
        assert!(nested.matches(&e));
        assert!(!Filter::default().requires_predicate());
    }

    #[test]
    fn test_debug_hides_predicate() {
        let filter = Filter::builder()
            .country("AR")
            .predicate(|_| true)
            .build()
            .unwrap();
        assert_eq!(
            format!("{filter:?}"),
            r#"Filter { country: "AR", predicate: "<fn>" }"#
        );
    }

    #[test]
    fn test_filter_config() {
        let config: FilterConfig = toml::from_str(
            r#"
            country = "AR"

            [[none_of]]
            isp = "acme"
            "#,
        )
        .unwrap();

        let filter = Filter::try_from(config).unwrap();
        let mut e = endpoint();
        e.country = Some("AR".into());
        assert!(filter.matches(&e));
        e.isp = Some("acme".into());
        assert!(!filter.matches(&e));
    }

    #[test]
    fn test_filter_config_is_validated() {
        let config: FilterConfig = toml::from_str(
            r#"
            [[any_of]]
            latitude = 12.0
            "#,
        )
        .unwrap();
        assert_eq!(
            Filter::try_from(config).unwrap_err(),
            ErrorKind::IncompleteCoordinates
        );
    }
}
