use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! row_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from a raw database id.
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the underlying database id.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

row_id! {
    /// Surrogate id of a shopping cart row.
    CartId
}

row_id! {
    /// Surrogate id of an order row. The human-readable order number is
    /// derived from this id after insert.
    OrderId
}

row_id! {
    /// Catalog product id.
    ProductId
}

row_id! {
    /// Authenticated user id.
    UserId
}

/// Error returned when a guest key does not look like a v4 UUID.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuestKeyError {
    #[error("guest key is not a valid UUID: {0}")]
    Malformed(String),

    #[error("guest key is not a v4 UUID: {0}")]
    WrongVersion(Uuid),
}

/// Anonymous-shopper key identifying a cart before authentication.
///
/// Only v4-shaped UUIDs are accepted, so arbitrary strings arriving in a
/// cookie can never be used as a cart lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestKey(Uuid);

impl GuestKey {
    /// Generates a fresh guest key.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses and validates a guest key from its string form.
    pub fn parse(s: &str) -> Result<Self, GuestKeyError> {
        let uuid = Uuid::parse_str(s).map_err(|_| GuestKeyError::Malformed(s.to_string()))?;
        if uuid.get_version_num() != 4 {
            return Err(GuestKeyError::WrongVersion(uuid));
        }
        Ok(Self(uuid))
    }

    /// Creates a guest key from an already-validated UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for GuestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<GuestKey> for Uuid {
    fn from(key: GuestKey) -> Self {
        key.0
    }
}
