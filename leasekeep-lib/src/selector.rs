use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};

use crate::Endpoint;

/// Strategy used to pick one endpoint out of several eligible ones
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Selector {
    /// Take the first eligible endpoint in pool insertion order
    #[default]
    FirstEligible,
    /// Take the endpoint with the fewest active leases. Ties go to the
    /// endpoint checked longest ago, then to the lowest ID.
    LeastLoaded,
    /// Rotate through the eligible endpoints, ordered by ID, using a cursor
    /// kept per pool
    RoundRobin,
}

impl Selector {
    /// Pick an endpoint from `candidates`.
    ///
    /// `cursor` is the pool's round-robin cursor. It is only read and
    /// advanced by [`Selector::RoundRobin`]. Returns `None` if there are no
    /// candidates, in which case the cursor is left untouched.
    pub fn select<'a>(
        self,
        candidates: &[&'a Endpoint],
        cursor: &mut usize,
    ) -> Option<&'a Endpoint> {
        match self {
            Self::FirstEligible => candidates.first().copied(),
            Self::LeastLoaded => candidates
                .iter()
                .copied()
                .min_by_key(|e| (e.current_leases, e.checked_at, e.id)),
            Self::RoundRobin => {
                if candidates.is_empty() {
                    return None;
                }
                let mut ordered = candidates.to_vec();
                ordered.sort_by_key(|e| e.id);
                let index = *cursor % ordered.len();
                *cursor = (index + 1) % ordered.len();
                Some(ordered[index])
            }
        }
    }
}
