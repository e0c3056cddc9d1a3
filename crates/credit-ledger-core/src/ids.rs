//! Identifier types for the credit ledger.
//!
//! Account and payment intent identifiers are opaque strings issued by other
//! systems (the user directory and the payment provider). Transaction
//! identifiers are ULIDs generated here.
//!
//! # Macro-based ID Types
//!
//! The `string_id_type!` macro reduces boilerplate for the opaque identifier
//! types, ensuring consistent validation, serialization and display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use ulid::{Generator, Ulid};

/// Longest accepted opaque identifier, in bytes.
pub const MAX_ID_LEN: usize = 255;

/// Macro to define an opaque string identifier with standard trait implementations.
///
/// Generated types reject empty, whitespace-only and over-long values, so a
/// constructed identifier is always usable as a storage key.
macro_rules! string_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create an identifier, validating the raw value.
            ///
            /// # Errors
            ///
            /// Returns an error if the value is empty, blank or too long.
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(IdError::Empty);
                }
                if value.len() > MAX_ID_LEN {
                    return Err(IdError::TooLong { len: value.len() });
                }
                Ok(Self(value))
            }

            /// Return the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the raw bytes of the identifier.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id_type!(
    AccountId,
    "An account identifier.\n\nOne account exists per user; the value is the user's id."
);
string_id_type!(
    PaymentIntentId,
    "A payment provider intent identifier (e.g. Stripe `pi_...`).\n\nThe provider issues these ids and is the source of truth for them."
);

/// A transaction identifier using ULID for time-ordering.
///
/// Ids come from a process-wide monotonic generator, so two transactions
/// created in the same millisecond still sort in creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId(Ulid);

fn generator() -> &'static Mutex<Generator> {
    static GENERATOR: OnceLock<Mutex<Generator>> = OnceLock::new();
    GENERATOR.get_or_init(|| Mutex::new(Generator::new()))
}

impl TransactionId {
    /// Create a new `TransactionId` from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Generate a new `TransactionId` with the current timestamp.
    #[must_use]
    pub fn generate() -> Self {
        let next = generator()
            .lock()
            .ok()
            .and_then(|mut g| g.generate().ok());
        // Monotonic overflow within one millisecond falls back to a random ULID.
        Self(next.unwrap_or_else(Ulid::new))
    }

    /// Return the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> &Ulid {
        &self.0
    }

    /// Return the bytes of the ULID (16 bytes).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.to_bytes()
    }

    /// Create a `TransactionId` from bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Ulid::from_bytes(bytes))
    }
}

impl FromStr for TransactionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
        Ok(Self(ulid))
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TransactionId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> Self {
        id.0.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is empty or only whitespace.
    #[error("identifier must not be empty")]
    Empty,

    /// The input exceeds [`MAX_ID_LEN`].
    #[error("identifier too long ({len} bytes)")]
    TooLong {
        /// Length of the rejected value.
        len: usize,
    },

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,
}
