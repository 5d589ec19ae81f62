//! In-memory ledger

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use ledgerflow_types::{
    JournalId, LedgerFlowError, LedgerTransaction, LedgerTransactionId, LedgerTransactionType,
    PaymentHash, PendingPayment, Result, WalletCurrency, WalletId,
};

use crate::{FeeReimbursementEntry, LedgerStore, PendingPaymentEntry, TransactionMetadata};

/// The LedgerFlow in-memory ledger
///
/// Entries live in a single append-only vector behind a lock. Clones share
/// the same entries.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    entries: Arc<RwLock<Vec<LedgerTransaction>>>,
    /// Metadata of each recorded fee reimbursement, in recording order
    reimbursements: Arc<RwLock<Vec<FeeReimbursementEntry>>>,
}

fn blank_entry(journal_id: &JournalId, currency: WalletCurrency, tx_type: LedgerTransactionType) -> LedgerTransaction {
    LedgerTransaction {
        id: LedgerTransactionId::new(),
        journal_id: journal_id.clone(),
        wallet_id: None,
        currency,
        debit: 0,
        credit: 0,
        fee: 0,
        fee_usd: 0,
        usd: 0,
        payment_hash: None,
        pubkey: None,
        tx_type,
        pending_confirmation: false,
        fee_known_in_advance: false,
        revealed_pre_image: None,
        reversal_of: None,
        timestamp: Utc::now(),
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outgoing network payment as pending
    ///
    /// Writes a wallet debit of amount plus fee and the matching credit on
    /// the settlement network liability account.
    pub async fn record_pending_payment(&self, payment: PendingPaymentEntry) -> Result<JournalId> {
        let total = payment
            .amount
            .checked_add(payment.fee)
            .ok_or(LedgerFlowError::AmountOverflow)?;
        let journal_id = JournalId::new();

        let mut debit = blank_entry(&journal_id, payment.currency, LedgerTransactionType::Payment);
        debit.wallet_id = Some(payment.wallet_id.clone());
        debit.debit = total;
        debit.fee = payment.fee;
        debit.usd = payment.usd;
        debit.fee_usd = payment.fee_usd;
        debit.payment_hash = Some(payment.payment_hash.clone());
        debit.pubkey = payment.pubkey.clone();
        debit.pending_confirmation = true;
        debit.fee_known_in_advance = payment.fee_known_in_advance;

        let mut credit = blank_entry(&journal_id, payment.currency, LedgerTransactionType::Payment);
        credit.credit = total;
        credit.usd = payment.usd;
        credit.payment_hash = Some(payment.payment_hash);
        credit.pubkey = payment.pubkey;
        credit.pending_confirmation = true;

        let mut entries = self.entries.write().await;
        entries.push(debit);
        entries.push(credit);

        debug!(journal_id = %journal_id, wallet_id = %payment.wallet_id, "Recorded pending payment");
        Ok(journal_id)
    }

    /// Append an entry as-is, for seeding ledgers with data they would not
    /// produce themselves
    pub async fn append_raw(&self, entry: LedgerTransaction) {
        self.entries.write().await.push(entry);
    }

    /// Net balance of a wallet in its smallest unit
    pub async fn wallet_balance(&self, wallet_id: &WalletId) -> i128 {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.wallet_id.as_ref() == Some(wallet_id))
            .map(|e| e.credit as i128 - e.debit as i128)
            .sum()
    }

    /// All entries of a journal
    pub async fn journal_entries(&self, journal_id: &JournalId) -> Vec<LedgerTransaction> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| &e.journal_id == journal_id)
            .cloned()
            .collect()
    }

    /// Entries of a given type
    pub async fn entries_of_type(&self, tx_type: LedgerTransactionType) -> Vec<LedgerTransaction> {
        let entries = self.entries.read().await;
        entries.iter().filter(|e| e.tx_type == tx_type).cloned().collect()
    }

    /// Fee reimbursements recorded so far
    pub async fn fee_reimbursements(&self) -> Vec<FeeReimbursementEntry> {
        self.reimbursements.read().await.clone()
    }

    /// Get the total number of entries
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn has_hash(entry: &LedgerTransaction, payment_hash: &PaymentHash) -> bool {
    entry.payment_hash.as_ref() == Some(payment_hash)
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn list_wallet_ids_with_pending_payments(&self) -> Result<Vec<WalletId>> {
        let entries = self.entries.read().await;
        let mut wallet_ids: Vec<WalletId> = Vec::new();
        for entry in entries.iter().filter(|e| e.is_pending_payment()) {
            if let Some(wallet_id) = &entry.wallet_id {
                if !wallet_ids.contains(wallet_id) {
                    wallet_ids.push(wallet_id.clone());
                }
            }
        }
        Ok(wallet_ids)
    }

    async fn get_pending_payments_count(&self, wallet_id: &WalletId) -> Result<usize> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.is_pending_payment() && e.wallet_id.as_ref() == Some(wallet_id))
            .count())
    }

    async fn list_pending_payments(&self, wallet_id: &WalletId) -> Result<Vec<PendingPayment>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.is_pending_payment() && e.wallet_id.as_ref() == Some(wallet_id))
            .cloned()
            .collect())
    }

    async fn is_finalized(&self, payment_hash: &PaymentHash) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .any(|e| has_hash(e, payment_hash) && !e.pending_confirmation))
    }

    async fn settle_pending(&self, payment_hash: &PaymentHash) -> Result<()> {
        let mut entries = self.entries.write().await;
        let mut settled = 0usize;
        for entry in entries
            .iter_mut()
            .filter(|e| has_hash(e, payment_hash) && e.pending_confirmation)
        {
            entry.pending_confirmation = false;
            settled += 1;
        }
        if settled == 0 {
            return Err(LedgerFlowError::NoTransactionToSettle {
                payment_hash: payment_hash.to_string(),
            });
        }
        debug!(payment_hash = %payment_hash, settled, "Settled pending entries");
        Ok(())
    }

    async fn revert_payment(&self, journal_id: &JournalId, payment_hash: &PaymentHash) -> Result<()> {
        let revert_failed = |reason: &str| LedgerFlowError::LedgerRevertFailed {
            journal_id: journal_id.to_string(),
            payment_hash: payment_hash.to_string(),
            reason: reason.to_string(),
        };

        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.reversal_of.as_ref() == Some(journal_id)) {
            return Err(revert_failed("journal already reverted"));
        }

        let originals: Vec<LedgerTransaction> = entries
            .iter()
            .filter(|e| &e.journal_id == journal_id)
            .cloned()
            .collect();
        if originals.is_empty() {
            return Err(revert_failed("journal not found"));
        }
        if !originals.iter().any(|e| has_hash(e, payment_hash)) {
            return Err(revert_failed("journal does not belong to this payment"));
        }

        let reversal_journal = JournalId::new();
        for original in &originals {
            let mut mirror = blank_entry(&reversal_journal, original.currency, LedgerTransactionType::Reversal);
            mirror.wallet_id = original.wallet_id.clone();
            mirror.debit = original.credit;
            mirror.credit = original.debit;
            mirror.usd = original.usd;
            mirror.payment_hash = original.payment_hash.clone();
            mirror.pubkey = original.pubkey.clone();
            mirror.reversal_of = Some(journal_id.clone());
            entries.push(mirror);
        }
        for entry in entries.iter_mut().filter(|e| &e.journal_id == journal_id) {
            entry.pending_confirmation = false;
        }

        debug!(journal_id = %journal_id, reversal_journal = %reversal_journal, "Reverted journal");
        Ok(())
    }

    async fn get_transactions_by_hash(&self, payment_hash: &PaymentHash) -> Result<Vec<LedgerTransaction>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| has_hash(e, payment_hash)).cloned().collect())
    }

    async fn update_metadata(&self, payment_hash: &PaymentHash, metadata: TransactionMetadata) -> Result<()> {
        let mut entries = self.entries.write().await;
        let mut updated = 0usize;
        for entry in entries.iter_mut().filter(|e| has_hash(e, payment_hash)) {
            if metadata.revealed_pre_image.is_some() {
                entry.revealed_pre_image = metadata.revealed_pre_image.clone();
            }
            updated += 1;
        }
        if updated == 0 {
            return Err(LedgerFlowError::CouldNotFindTransaction {
                payment_hash: payment_hash.to_string(),
            });
        }
        Ok(())
    }

    async fn record_fee_reimbursement(&self, reimbursement: FeeReimbursementEntry) -> Result<JournalId> {
        let journal_id = JournalId::new();

        let mut credit = blank_entry(&journal_id, reimbursement.currency, LedgerTransactionType::FeeReimbursement);
        credit.wallet_id = Some(reimbursement.wallet_id.clone());
        credit.credit = reimbursement.amount;
        credit.usd = reimbursement.usd;
        credit.payment_hash = Some(reimbursement.payment_hash.clone());
        credit.revealed_pre_image = reimbursement.revealed_pre_image.clone();

        let mut debit = blank_entry(&journal_id, reimbursement.currency, LedgerTransactionType::FeeReimbursement);
        debit.debit = reimbursement.amount;
        debit.usd = reimbursement.usd;
        debit.payment_hash = Some(reimbursement.payment_hash.clone());

        let mut entries = self.entries.write().await;
        entries.push(credit);
        entries.push(debit);
        drop(entries);

        debug!(
            journal_id = %journal_id,
            original_journal_id = %reimbursement.original_journal_id,
            wallet_id = %reimbursement.wallet_id,
            amount = reimbursement.amount,
            payment_amount = reimbursement.payment_amount,
            "Recorded fee reimbursement"
        );
        self.reimbursements.write().await.push(reimbursement);
        Ok(journal_id)
    }
}
