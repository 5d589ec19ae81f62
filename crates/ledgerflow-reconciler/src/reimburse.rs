//! Fee reimbursement
//!
//! Network payments reserve a routing fee up front. Once the network reports
//! the fee actually paid, the difference goes back to the sender.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use ledgerflow_ledger::{FeeReimbursementEntry, LedgerStore};
use ledgerflow_payments::{FeeReimbursement, PaymentFlow, Reimbursement};
use ledgerflow_types::{
    BtcPaymentAmount, JournalId, LedgerFlowError, Result, RevealedPreImage, WalletCurrency,
};

/// Arguments to a fee reimbursement
#[derive(Debug, Clone)]
pub struct ReimburseFeeArgs {
    pub flow: PaymentFlow,
    /// Journal of the original payment
    pub journal_id: JournalId,
    pub actual_fee: BtcPaymentAmount,
    pub revealed_pre_image: Option<RevealedPreImage>,
    /// Amount that reached the network, excluding the fee, in the sender's
    /// currency. Recorded with the reimbursement journal.
    pub payment_amount: u64,
}

/// Hands back the unused part of a reserved fee
#[async_trait]
pub trait FeeReimburser: Send + Sync {
    /// Returns what was refunded, or `None` when nothing was owed
    async fn reimburse(&self, args: ReimburseFeeArgs) -> Result<Option<Reimbursement>>;
}

/// Reimburser that credits the sender wallet on the ledger
pub struct LedgerFeeReimburser {
    ledger: Arc<dyn LedgerStore>,
}

impl LedgerFeeReimburser {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl FeeReimburser for LedgerFeeReimburser {
    async fn reimburse(&self, args: ReimburseFeeArgs) -> Result<Option<Reimbursement>> {
        let flow = &args.flow;
        let payment_hash = flow.payment_hash().cloned().ok_or_else(|| {
            LedgerFlowError::inconsistent_data("fee reimbursement requested for a flow without payment hash")
        })?;

        let price_ratio = flow.price_ratio()?;
        let Some(reimbursement) = FeeReimbursement::new(flow.btc_protocol_fee, price_ratio).reimbursement(args.actual_fee)
        else {
            debug!(
                prepaid_fee = %flow.btc_protocol_fee,
                actual_fee = %args.actual_fee,
                "No fee difference to reimburse"
            );
            return Ok(None);
        };

        let amount = match flow.sender_wallet_currency {
            WalletCurrency::Btc => reimbursement.btc.amount(),
            WalletCurrency::Usd => reimbursement.usd.amount(),
        };
        if amount == 0 {
            debug!(btc = %reimbursement.btc, "Fee difference rounds to zero in wallet currency");
            return Ok(None);
        }

        let entry = FeeReimbursementEntry {
            wallet_id: flow.sender_wallet_id.clone(),
            currency: flow.sender_wallet_currency,
            payment_hash,
            original_journal_id: args.journal_id.clone(),
            amount,
            usd: reimbursement.usd.amount(),
            payment_amount: args.payment_amount,
            revealed_pre_image: args.revealed_pre_image.clone(),
        };
        let journal_id = self
            .ledger
            .record_fee_reimbursement(entry)
            .await
            .map_err(|e| LedgerFlowError::FeeReimbursementFailed {
                journal_id: args.journal_id.to_string(),
                reason: e.to_string(),
            })?;

        info!(
            journal_id = %journal_id,
            btc = %reimbursement.btc,
            usd = %reimbursement.usd,
            "Reimbursed unused network fee"
        );
        Ok(Some(reimbursement))
    }
}
