//! Identity types for LedgerFlow
//!
//! Identifiers are strongly typed wrappers so a journal id can never be passed
//! where a wallet id is expected.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::{LedgerFlowError, Result};

/// Macro to generate UUID-backed ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

/// Macro for opaque string identifiers handed to us by other systems
macro_rules! define_string_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw value
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id_type!(WalletId, "wallet", "Unique identifier for a wallet");
define_id_type!(JournalId, "journal", "Unique identifier for a ledger journal (one balanced group of entries)");
define_id_type!(LedgerTransactionId, "ltx", "Unique identifier for a single ledger entry");

define_string_type!(Pubkey, "Public key of a settlement network node");
define_string_type!(RevealedPreImage, "Pre-image revealed by the settlement network once a payment settles");
define_string_type!(SecretPreImage, "Pre-image generated locally for an invoice");
define_string_type!(OnChainAddress, "On-chain destination address");
define_string_type!(Username, "Username of a wallet owner");

/// Hash identifying a network payment: 32 bytes, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentHash(String);

impl PaymentHash {
    /// Parse a hex-encoded payment hash
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let value = value.as_ref().to_ascii_lowercase();
        if value.len() != 64 || hex::decode(&value).is_err() {
            return Err(LedgerFlowError::invalid_builder_state(format!(
                "invalid payment hash '{}'",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Hash of a pre-image given as hex
    pub fn from_preimage(preimage_hex: &str) -> Result<Self> {
        let bytes = hex::decode(preimage_hex).map_err(|e| {
            LedgerFlowError::inconsistent_data(format!("pre-image is not hex: {}", e))
        })?;
        Ok(Self(hex::encode(Sha256::digest(&bytes))))
    }

    /// Whether a revealed pre-image hashes to this payment hash
    pub fn matches_preimage(&self, preimage: &RevealedPreImage) -> bool {
        Self::from_preimage(preimage.as_str())
            .map(|hash| &hash == self)
            .unwrap_or(false)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the finalization right for this hash is locked
    pub fn lock_key(&self) -> String {
        format!("locks:paymenthash:{}", self.0)
    }
}

impl fmt::Display for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PaymentHash {
    type Error = LedgerFlowError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<PaymentHash> for String {
    fn from(hash: PaymentHash) -> Self {
        hash.0
    }
}

/// Generate a random 32-byte secret and the payment hash that commits to it
pub fn generate_secret_and_payment_hash() -> (SecretPreImage, PaymentHash) {
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    let payment_hash = PaymentHash(hex::encode(Sha256::digest(secret)));
    (SecretPreImage::new(hex::encode(secret)), payment_hash)
}
