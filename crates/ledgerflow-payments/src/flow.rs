//! Payment flow - the validated, currency-resolved description of a transfer
//!
//! A `PaymentFlow` is produced by the staged builder or rebuilt from ledger
//! history, and is never mutated afterwards. A corrected flow is a new value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerflow_types::{
    BtcPaymentAmount, OnChainAddress, PaymentHash, Pubkey, Result, UsdPaymentAmount, Username,
    WalletCurrency, WalletId,
};

use crate::PriceRatio;

/// How value actually moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMethod {
    Lightning,
    OnChain,
    IntraLedger,
}

/// What the sender asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentInitiationMethod {
    Lightning,
    OnChain,
}

/// Where the payment goes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    PaymentHash(PaymentHash),
    Address(OnChainAddress),
}

impl Destination {
    pub fn initiation_method(&self) -> PaymentInitiationMethod {
        match self {
            Self::PaymentHash(_) => PaymentInitiationMethod::Lightning,
            Self::Address(_) => PaymentInitiationMethod::OnChain,
        }
    }
}

/// A fully built payment flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFlow {
    pub sender_wallet_id: WalletId,
    pub sender_wallet_currency: WalletCurrency,
    pub recipient_wallet_id: Option<WalletId>,
    pub recipient_wallet_currency: Option<WalletCurrency>,
    pub recipient_pubkey: Option<Pubkey>,
    pub recipient_username: Option<Username>,
    pub destination: Destination,
    pub description_from_invoice: String,
    /// Amount entered by the sender, in the sender's currency
    pub input_amount: u64,
    pub btc_payment_amount: BtcPaymentAmount,
    pub usd_payment_amount: UsdPaymentAmount,
    pub btc_protocol_fee: BtcPaymentAmount,
    pub usd_protocol_fee: UsdPaymentAmount,
    pub settlement_method: SettlementMethod,
    pub payment_initiation_method: PaymentInitiationMethod,
    pub created_at: DateTime<Utc>,
    pub payment_sent_and_pending: bool,
}

impl PaymentFlow {
    pub fn payment_hash(&self) -> Option<&PaymentHash> {
        match &self.destination {
            Destination::PaymentHash(hash) => Some(hash),
            Destination::Address(_) => None,
        }
    }

    pub fn address(&self) -> Option<&OnChainAddress> {
        match &self.destination {
            Destination::Address(address) => Some(address),
            Destination::PaymentHash(_) => None,
        }
    }

    pub fn is_intra_ledger(&self) -> bool {
        self.settlement_method == SettlementMethod::IntraLedger
    }

    /// Protocol fee in the smallest unit of the sender's currency
    pub fn protocol_fee_in_sender_wallet_currency(&self) -> u64 {
        match self.sender_wallet_currency {
            WalletCurrency::Btc => self.btc_protocol_fee.amount(),
            WalletCurrency::Usd => self.usd_protocol_fee.amount(),
        }
    }

    /// Payment amount in both currencies
    pub fn payment_amounts(&self) -> (BtcPaymentAmount, UsdPaymentAmount) {
        (self.btc_payment_amount, self.usd_payment_amount)
    }

    /// Ratio in effect when the flow was built
    pub fn price_ratio(&self) -> Result<PriceRatio> {
        PriceRatio::new(self.usd_payment_amount, self.btc_payment_amount)
    }

    /// Copy with the pending flag replaced
    pub fn with_payment_sent_and_pending(&self, payment_sent_and_pending: bool) -> Self {
        Self {
            payment_sent_and_pending,
            ..self.clone()
        }
    }
}
