//! Settlement network lookup types

use serde::{Deserialize, Serialize};

use crate::{BtcPaymentAmount, PaymentHash, Pubkey, RevealedPreImage};

/// Status of a payment as reported by the settlement network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Settled,
    Failed,
    Pending,
}

impl PaymentStatus {
    /// Settled and failed payments need a ledger decision
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed)
    }
}

/// Details only known once a payment has settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedDetails {
    /// Routing fee actually paid, rounded up to whole sats
    pub rounded_up_fee: BtcPaymentAmount,
    pub revealed_pre_image: Option<RevealedPreImage>,
}

/// Result of asking the settlement network about a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLookup {
    pub payment_hash: PaymentHash,
    pub status: PaymentStatus,
    /// Amount delivered, rounded up to whole sats
    pub rounded_up_amount: BtcPaymentAmount,
    pub confirmed_details: Option<ConfirmedDetails>,
}

impl PaymentLookup {
    /// Fee the network reports, zero when not yet known
    pub fn rounded_up_fee(&self) -> BtcPaymentAmount {
        self.confirmed_details
            .as_ref()
            .map(|d| d.rounded_up_fee)
            .unwrap_or_default()
    }

    pub fn revealed_pre_image(&self) -> Option<&RevealedPreImage> {
        self.confirmed_details
            .as_ref()
            .and_then(|d| d.revealed_pre_image.as_ref())
    }
}

/// Arguments to a settlement network lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPaymentArgs {
    /// Node that sent the payment; `None` searches all nodes
    pub pubkey: Option<Pubkey>,
    pub payment_hash: PaymentHash,
}
