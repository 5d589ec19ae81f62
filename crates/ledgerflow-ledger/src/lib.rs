//! LedgerFlow Ledger - Append-only double-entry ledger for wallet payments
//!
//! The ledger is:
//! - Wallet-keyed (the ledger's own accounts carry no wallet id)
//! - Double-entry (every journal balances debits against credits)
//! - Append-only (reverting a journal appends its mirror)
//! - Hash-linked (network payment entries carry their payment hash)
//!
//! # Invariants
//!
//! 1. A payment hash is finalized at most once
//! 2. Settling only clears the pending flag; amounts are never rewritten
//! 3. A journal is reverted at most once

mod memory;

pub use memory::InMemoryLedger;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ledgerflow_types::{
    JournalId, LedgerTransaction, PaymentHash, PendingPayment, Pubkey, Result, RevealedPreImage,
    WalletCurrency, WalletId,
};

/// Metadata attached to the entries of a payment after the fact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub revealed_pre_image: Option<RevealedPreImage>,
}

/// An outgoing network payment waiting on the settlement network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPaymentEntry {
    pub wallet_id: WalletId,
    pub currency: WalletCurrency,
    pub payment_hash: PaymentHash,
    pub pubkey: Option<Pubkey>,
    /// Amount sent, in the wallet's currency, excluding the fee
    pub amount: u64,
    /// Fee reserved for the network, in the wallet's currency
    pub fee: u64,
    /// Usd value of `amount` in cents
    pub usd: u64,
    /// Usd value of `fee` in cents
    pub fee_usd: u64,
    pub fee_known_in_advance: bool,
}

/// Refund of an overpaid network fee to the sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeReimbursementEntry {
    pub wallet_id: WalletId,
    pub currency: WalletCurrency,
    pub payment_hash: PaymentHash,
    /// Journal of the payment the fee was reserved for
    pub original_journal_id: JournalId,
    /// Refund in the wallet's currency
    pub amount: u64,
    /// Refund in cents
    pub usd: u64,
    /// Amount of the original payment, excluding the fee, in the wallet's currency
    pub payment_amount: u64,
    pub revealed_pre_image: Option<RevealedPreImage>,
}

/// Ledger operations the reconciler depends on
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn list_wallet_ids_with_pending_payments(&self) -> Result<Vec<WalletId>>;

    async fn get_pending_payments_count(&self, wallet_id: &WalletId) -> Result<usize>;

    async fn list_pending_payments(&self, wallet_id: &WalletId) -> Result<Vec<PendingPayment>>;

    /// Whether a payment hash already has non-pending entries
    async fn is_finalized(&self, payment_hash: &PaymentHash) -> Result<bool>;

    /// Clear the pending flag on every entry of the payment
    async fn settle_pending(&self, payment_hash: &PaymentHash) -> Result<()>;

    /// Void a payment journal by appending its mirror
    async fn revert_payment(&self, journal_id: &JournalId, payment_hash: &PaymentHash) -> Result<()>;

    async fn get_transactions_by_hash(&self, payment_hash: &PaymentHash) -> Result<Vec<LedgerTransaction>>;

    /// Attach metadata to every entry of the payment
    async fn update_metadata(&self, payment_hash: &PaymentHash, metadata: TransactionMetadata) -> Result<()>;

    /// Credit a fee refund to the sender, returning the new journal
    async fn record_fee_reimbursement(&self, entry: FeeReimbursementEntry) -> Result<JournalId>;
}
