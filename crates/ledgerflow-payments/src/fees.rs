//! Protocol fees and fee reimbursement

use ledgerflow_types::{BtcPaymentAmount, UsdPaymentAmount};
use serde::{Deserialize, Serialize};

use crate::PriceRatio;

/// A protocol fee known in both currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolFees {
    pub btc: BtcPaymentAmount,
    pub usd: UsdPaymentAmount,
}

/// Flat protocol fees by settlement method
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolFeeSchedule {
    /// Intra-ledger fee in sats
    #[serde(default)]
    pub intra_ledger_sats: u64,

    /// Intra-ledger fee in cents
    #[serde(default)]
    pub intra_ledger_cents: u64,

    /// Fee charged for on-chain payouts, in sats
    #[serde(default)]
    pub onchain_sats: u64,

    /// Fee reserved for lightning routing, in sats
    #[serde(default)]
    pub lightning_sats: u64,
}

impl ProtocolFeeSchedule {
    pub fn intra_ledger_fees(&self) -> ProtocolFees {
        ProtocolFees {
            btc: BtcPaymentAmount::new(self.intra_ledger_sats),
            usd: UsdPaymentAmount::new(self.intra_ledger_cents),
        }
    }

    pub fn onchain_fee(&self) -> BtcPaymentAmount {
        BtcPaymentAmount::new(self.onchain_sats)
    }

    pub fn lightning_fee(&self) -> BtcPaymentAmount {
        BtcPaymentAmount::new(self.lightning_sats)
    }
}

/// Amount handed back when the network charged less than was reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reimbursement {
    pub btc: BtcPaymentAmount,
    pub usd: UsdPaymentAmount,
}

/// Difference between a prepaid fee and the fee actually charged
#[derive(Debug, Clone, Copy)]
pub struct FeeReimbursement {
    prepaid_fee: BtcPaymentAmount,
    price_ratio: PriceRatio,
}

impl FeeReimbursement {
    pub fn new(prepaid_fee: BtcPaymentAmount, price_ratio: PriceRatio) -> Self {
        Self {
            prepaid_fee,
            price_ratio,
        }
    }

    /// `None` when nothing is owed back. The usd side rounds down so the
    /// protocol never refunds more than it collected.
    pub fn reimbursement(&self, actual_fee: BtcPaymentAmount) -> Option<Reimbursement> {
        let btc = self.prepaid_fee.checked_sub(actual_fee)?;
        if btc.is_zero() {
            return None;
        }
        Some(Reimbursement {
            btc,
            usd: self.price_ratio.convert_from_btc_to_floor(btc),
        })
    }
}
