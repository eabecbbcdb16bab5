use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Declares an opaque, caller-supplied string identifier.
///
/// The wrapped value is never interpreted. `parse` rejects blank input;
/// `new` does not and is meant for values that were already validated.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a value without validation.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Wrap a value, rejecting empty or whitespace-only input.
            pub fn parse(value: impl Into<String>) -> Result<Self, TypeError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(TypeError::Blank { field: $field });
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns `true` if the value is empty or whitespace-only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// Caller-supplied batch identifier. Unique and immutable once registered.
    BatchId,
    "batch_id"
);

opaque_id!(
    /// Address or identity of a custodial party.
    PartyId,
    "party"
);

opaque_id!(
    /// Off-chain content pointer (document hash or URI) attached at registration.
    MetadataRef,
    "metadata_ref"
);

opaque_id!(
    /// Client-chosen key that makes a logical write safe to resend.
    IdempotencyKey,
    "idempotency_key"
);

impl IdempotencyKey {
    /// Generate a fresh, time-ordered key.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
}

/// Opaque proof token returned for a confirmed commit.
///
/// For an external ledger this is its transaction hash. The in-memory store
/// derives it from the entry hash. Callers display it; the core never
/// re-validates it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRef(String);

impl TransactionRef {
    /// Wrap a reference reported by an external ledger.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Reference for a locally hashed entry: `0x` followed by the hex digest.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(format!("0x{}", hex::encode(hash)))
    }

    /// Recover the digest from a reference produced by [`Self::from_hash`].
    pub fn to_hash(&self) -> Result<[u8; 32], TypeError> {
        let digits = self
            .0
            .strip_prefix("0x")
            .ok_or_else(|| TypeError::InvalidTransactionRef(self.0.clone()))?;
        let bytes =
            hex::decode(digits).map_err(|_| TypeError::InvalidTransactionRef(self.0.clone()))?;
        bytes
            .try_into()
            .map_err(|_| TypeError::InvalidTransactionRef(self.0.clone()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines and terminal output.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(10);
        &self.0[..end]
    }
}

impl fmt::Debug for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionRef({})", self.0)
    }
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
