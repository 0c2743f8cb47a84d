use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declares a UUID-backed identifier type.
///
/// Every record kind gets its own identifier so that an [`EndpointId`] can
/// never be passed where a [`LeaseId`] is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Get the underlying UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifies an [`crate::Endpoint`]
    EndpointId
);
uuid_id!(
    /// Identifies a [`crate::Pool`]
    PoolId
);
uuid_id!(
    /// Identifies a [`crate::Consumer`]
    ConsumerId
);
uuid_id!(
    /// Identifies a [`crate::Lease`]
    LeaseId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(EndpointId::new(), EndpointId::new());
    }

    #[test]
    fn test_id_parse_and_display() {
        let raw = "6f1c1e8e-0d39-4d0e-9a55-6b7f1b1f0c11";
        let id: LeaseId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
        assert!("not-a-uuid".parse::<PoolId>().is_err());
    }

    #[test]
    fn test_ids_order_like_uuids() {
        let low = EndpointId::from(Uuid::from_u128(1));
        let high = EndpointId::from(Uuid::from_u128(2));
        assert!(low < high);
    }
}
