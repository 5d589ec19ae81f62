//! Ledger reconstruction of payment flows
//!
//! When the cached flow for a payment is gone, the pending ledger entry is the
//! only record of what was sent. The btc side of a usd payment is not on the
//! entry and has to come from the settlement network.

use std::sync::Arc;

use tracing::{debug, warn};

use ledgerflow_ledger::LedgerStore;
use ledgerflow_payments::{Destination, PaymentFlow, PaymentInitiationMethod, PriceRatio, SettlementMethod};
use ledgerflow_settlement::{LookupPaymentArgs, PaymentStatus, SettlementNetwork};
use ledgerflow_types::{
    BtcPaymentAmount, LedgerFlowError, LedgerTransaction, LedgerTransactionType, PaymentHash, Result,
    UsdPaymentAmount, WalletCurrency,
};

/// Rebuilds payment flows from ledger history
#[derive(Clone)]
pub struct LedgerReconstructor {
    ledger: Arc<dyn LedgerStore>,
    network: Arc<dyn SettlementNetwork>,
}

fn is_pending_debit(tx: &LedgerTransaction) -> bool {
    tx.pending_confirmation && tx.tx_type == LedgerTransactionType::Payment && tx.debit > 0
}

impl LedgerReconstructor {
    pub fn new(ledger: Arc<dyn LedgerStore>, network: Arc<dyn SettlementNetwork>) -> Self {
        Self { ledger, network }
    }

    pub async fn reconstruct(&self, payment_hash: &PaymentHash) -> Result<PaymentFlow> {
        let transactions = self.ledger.get_transactions_by_hash(payment_hash).await?;
        let payment = transactions
            .into_iter()
            .find(is_pending_debit)
            .ok_or_else(|| LedgerFlowError::CouldNotFindTransaction {
                payment_hash: payment_hash.to_string(),
            })?;

        let sender_wallet_id = payment.wallet_id.clone().ok_or_else(|| LedgerFlowError::UnknownLedger {
            message: format!("pending payment {} has no wallet", payment.id),
        })?;
        let sender_wallet_currency = payment.currency;
        let input_amount = payment.input_amount();

        let (btc_payment_amount, usd_payment_amount, btc_protocol_fee, usd_protocol_fee) = match sender_wallet_currency {
            WalletCurrency::Btc => (
                BtcPaymentAmount::new(input_amount),
                UsdPaymentAmount::new(payment.usd),
                BtcPaymentAmount::new(payment.fee),
                UsdPaymentAmount::new(payment.fee_usd),
            ),
            WalletCurrency::Usd => {
                let usd = UsdPaymentAmount::new(input_amount);
                let btc = self.btc_amount_from_network(&payment, payment_hash).await?;
                let usd_fee = UsdPaymentAmount::new(payment.fee);
                let btc_fee = if usd_fee.is_zero() {
                    BtcPaymentAmount::zero()
                } else {
                    PriceRatio::new(usd, btc)?.convert_from_usd_to_floor(usd_fee)?
                };
                (btc, usd, btc_fee, usd_fee)
            }
        };

        debug!(
            payment_hash = %payment_hash,
            sender_wallet_id = %sender_wallet_id,
            btc = %btc_payment_amount,
            usd = %usd_payment_amount,
            "Reconstructed payment flow from ledger"
        );

        Ok(PaymentFlow {
            sender_wallet_id,
            sender_wallet_currency,
            recipient_wallet_id: None,
            recipient_wallet_currency: None,
            recipient_pubkey: payment.pubkey.clone(),
            recipient_username: None,
            destination: Destination::PaymentHash(payment_hash.clone()),
            description_from_invoice: String::new(),
            input_amount,
            btc_payment_amount,
            usd_payment_amount,
            btc_protocol_fee,
            usd_protocol_fee,
            settlement_method: SettlementMethod::Lightning,
            payment_initiation_method: PaymentInitiationMethod::Lightning,
            created_at: payment.timestamp,
            payment_sent_and_pending: true,
        })
    }

    /// Amount the network delivered; the ledger entry only knows cents
    async fn btc_amount_from_network(
        &self,
        payment: &LedgerTransaction,
        payment_hash: &PaymentHash,
    ) -> Result<BtcPaymentAmount> {
        let lookup = self
            .network
            .lookup_payment(LookupPaymentArgs {
                pubkey: payment.pubkey.clone(),
                payment_hash: payment_hash.clone(),
            })
            .await?;
        if lookup.status == PaymentStatus::Failed {
            warn!(payment_hash = %payment_hash, "Cannot recover btc amount of a failed payment");
            return Err(LedgerFlowError::UnknownLightningService {
                message: format!("payment {} failed; btc amount cannot be recovered", payment_hash),
            });
        }
        Ok(lookup.rounded_up_amount)
    }
}
