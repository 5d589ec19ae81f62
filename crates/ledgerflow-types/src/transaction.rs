//! Ledger transaction types
//!
//! A `LedgerTransaction` is one entry of an append-only double-entry journal.
//! Pending network payments are entries with `pending_confirmation = true`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JournalId, LedgerTransactionId, PaymentHash, Pubkey, RevealedPreImage, WalletCurrency, WalletId};

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTransactionType {
    /// Outgoing settlement network payment
    Payment,
    /// Incoming settlement network payment
    Invoice,
    /// Transfer between two wallets on this ledger
    IntraLedger,
    /// Outgoing on-chain payment
    OnchainPayment,
    /// Refund of an overpaid network fee
    FeeReimbursement,
    /// Mirror of an entry from a voided journal
    Reversal,
}

/// A single ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: LedgerTransactionId,
    pub journal_id: JournalId,
    /// Owning wallet; `None` for the ledger's own accounts
    pub wallet_id: Option<WalletId>,
    pub currency: WalletCurrency,
    /// Debit in the entry's currency (smallest unit)
    pub debit: u64,
    /// Credit in the entry's currency (smallest unit)
    pub credit: u64,
    /// Network fee in the entry's currency, included in `debit`
    pub fee: u64,
    /// Network fee in cents
    pub fee_usd: u64,
    /// Usd value of the entry's amount in cents
    pub usd: u64,
    pub payment_hash: Option<PaymentHash>,
    /// Counterparty node public key
    pub pubkey: Option<Pubkey>,
    pub tx_type: LedgerTransactionType,
    pub pending_confirmation: bool,
    /// The fee was fixed when the payment was sent, so nothing is reimbursed
    pub fee_known_in_advance: bool,
    pub revealed_pre_image: Option<RevealedPreImage>,
    /// Journal this entry voids, for reversal entries
    pub reversal_of: Option<JournalId>,
    pub timestamp: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Amount the sender entered, excluding the fee
    pub fn input_amount(&self) -> u64 {
        self.debit.saturating_sub(self.fee)
    }

    /// Amount that reached the network, excluding the fee
    pub fn payment_amount(&self) -> u64 {
        self.debit.max(self.credit).saturating_sub(self.fee)
    }

    /// Outgoing network payment still waiting on the settlement network
    pub fn is_pending_payment(&self) -> bool {
        self.pending_confirmation && self.tx_type == LedgerTransactionType::Payment && self.debit > 0
    }
}

/// Alias used where a ledger entry is read as a provisional payment
pub type PendingPayment = LedgerTransaction;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(debit: u64, credit: u64, fee: u64) -> LedgerTransaction {
        LedgerTransaction {
            id: LedgerTransactionId::new(),
            journal_id: JournalId::new(),
            wallet_id: Some(WalletId::new()),
            currency: WalletCurrency::Btc,
            debit,
            credit,
            fee,
            fee_usd: 0,
            usd: 0,
            payment_hash: None,
            pubkey: None,
            tx_type: LedgerTransactionType::Payment,
            pending_confirmation: true,
            fee_known_in_advance: false,
            revealed_pre_image: None,
            reversal_of: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_amounts_exclude_fee() {
        let debit = entry(50_500, 0, 500);
        assert_eq!(debit.input_amount(), 50_000);
        assert_eq!(debit.payment_amount(), 50_000);

        let credit = entry(0, 10_000, 0);
        assert_eq!(credit.payment_amount(), 10_000);
        assert!(!credit.is_pending_payment());
        assert!(debit.is_pending_payment());
    }
}
