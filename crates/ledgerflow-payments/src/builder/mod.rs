//! Staged payment flow builder
//!
//! Each stage is its own type and only offers the calls valid at that point:
//!
//! ```text
//! PaymentFlowBuilder -> WithDestination -> WithSenderWallet -> WithAmount
//!     -> WithRecipientWallet -> with_conversion -> PaymentFlow
//! ```
//!
//! Fallible stages return `Result`. The extension traits in [`chain`] let a
//! caller keep chaining on the `Result` itself; once a stage fails, later
//! calls hand back the same error and never reach the price service.

pub mod chain;

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use ledgerflow_types::{
    checked_to_btc_payment_amount, checked_to_usd_payment_amount, BtcPaymentAmount,
    LedgerFlowError, OnChainAddress, PaymentHash, Pubkey, RecipientWallet, Result,
    UsdPaymentAmount, WalletCurrency, WalletDescriptor,
};

use crate::{
    Destination, PaymentFlow, PaymentInitiationMethod, PriceConverter, PriceRatio,
    ProtocolFeeSchedule, ProtocolFees, SettlementMethod,
};

pub use chain::{
    WithAmountResultExt, WithDestinationResultExt, WithRecipientWalletResultExt,
    WithSenderWalletResultExt,
};

/// Settings shared by every flow a builder produces
pub struct PaymentFlowBuilderConfig {
    pub fees: ProtocolFeeSchedule,
    /// Mid-price converter used when the transfer stays in one currency
    pub mid_price: Arc<dyn PriceConverter>,
}

impl PaymentFlowBuilderConfig {
    pub fn new(fees: ProtocolFeeSchedule, mid_price: Arc<dyn PriceConverter>) -> Self {
        Self { fees, mid_price }
    }
}

impl std::fmt::Debug for PaymentFlowBuilderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentFlowBuilderConfig")
            .field("fees", &self.fees)
            .finish_non_exhaustive()
    }
}

/// Entry point of the staged builder
#[derive(Debug, Clone)]
pub struct PaymentFlowBuilder {
    config: Arc<PaymentFlowBuilderConfig>,
}

impl PaymentFlowBuilder {
    pub fn new(config: PaymentFlowBuilderConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn from_shared(config: Arc<PaymentFlowBuilderConfig>) -> Self {
        Self { config }
    }

    pub fn with_destination(&self, destination: Destination) -> Result<WithDestination> {
        if let Destination::Address(address) = &destination {
            if address.is_empty() {
                return Err(LedgerFlowError::invalid_builder_state("empty destination address"));
            }
        }
        Ok(WithDestination {
            config: Arc::clone(&self.config),
            destination,
            description: String::new(),
            recipient_pubkey: None,
        })
    }

    /// Destination from a hex-encoded payment hash
    pub fn with_payment_hash(&self, payment_hash: &str) -> Result<WithDestination> {
        self.with_destination(Destination::PaymentHash(PaymentHash::parse(payment_hash)?))
    }

    /// Destination from an on-chain address
    pub fn with_address(&self, address: &str) -> Result<WithDestination> {
        self.with_destination(Destination::Address(OnChainAddress::new(address.trim())))
    }
}

/// A destination is known
#[derive(Debug, Clone)]
pub struct WithDestination {
    config: Arc<PaymentFlowBuilderConfig>,
    destination: Destination,
    description: String,
    recipient_pubkey: Option<Pubkey>,
}

impl WithDestination {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Node the payment is routed to, for network payments
    pub fn with_recipient_pubkey(mut self, pubkey: Pubkey) -> Self {
        self.recipient_pubkey = Some(pubkey);
        self
    }

    pub fn with_sender_wallet(self, sender: WalletDescriptor) -> WithSenderWallet {
        WithSenderWallet { base: self, sender }
    }
}

/// Amount entered by the sender, in the sender's currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderAmount {
    Btc(BtcPaymentAmount),
    Usd(UsdPaymentAmount),
}

impl SenderAmount {
    pub fn amount(&self) -> u64 {
        match self {
            Self::Btc(btc) => btc.amount(),
            Self::Usd(usd) => usd.amount(),
        }
    }

    pub fn currency(&self) -> WalletCurrency {
        match self {
            Self::Btc(_) => WalletCurrency::Btc,
            Self::Usd(_) => WalletCurrency::Usd,
        }
    }
}

/// Sender wallet is known
#[derive(Debug, Clone)]
pub struct WithSenderWallet {
    base: WithDestination,
    sender: WalletDescriptor,
}

impl WithSenderWallet {
    /// Validate a raw amount against the sender's currency
    pub fn with_amount(self, raw_amount: f64) -> Result<WithAmount> {
        let amount = match self.sender.currency {
            WalletCurrency::Btc => SenderAmount::Btc(checked_to_btc_payment_amount(raw_amount)?),
            WalletCurrency::Usd => SenderAmount::Usd(checked_to_usd_payment_amount(raw_amount)?),
        };
        Ok(WithAmount {
            base: self.base,
            sender: self.sender,
            amount,
        })
    }
}

/// Amount is validated
#[derive(Debug, Clone)]
pub struct WithAmount {
    base: WithDestination,
    sender: WalletDescriptor,
    amount: SenderAmount,
}

impl WithAmount {
    /// Recipient on this ledger; settles intra-ledger
    pub fn with_recipient_wallet(self, recipient: impl Into<RecipientWallet>) -> Result<WithRecipientWallet> {
        let recipient = recipient.into();
        if recipient.id == self.sender.id {
            return Err(LedgerFlowError::SelfPayment);
        }
        let fees = FeeState::Known(self.base.config.fees.intra_ledger_fees());
        Ok(WithRecipientWallet {
            base: self.base,
            sender: self.sender,
            amount: self.amount,
            recipient: Some(recipient),
            settlement_method: SettlementMethod::IntraLedger,
            fees,
        })
    }

    /// No local recipient; settles over the network the payment was initiated on
    pub fn without_recipient_wallet(self) -> WithRecipientWallet {
        let schedule = &self.base.config.fees;
        let (settlement_method, fee) = match self.base.destination.initiation_method() {
            PaymentInitiationMethod::Lightning => (SettlementMethod::Lightning, schedule.lightning_fee()),
            PaymentInitiationMethod::OnChain => (SettlementMethod::OnChain, schedule.onchain_fee()),
        };
        WithRecipientWallet {
            base: self.base,
            sender: self.sender,
            amount: self.amount,
            recipient: None,
            settlement_method,
            fees: FeeState::BtcOnly(fee),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FeeState {
    Known(ProtocolFees),
    BtcOnly(BtcPaymentAmount),
}

/// Recipient (or its absence) is settled; only conversion is left
#[derive(Debug, Clone)]
pub struct WithRecipientWallet {
    base: WithDestination,
    sender: WalletDescriptor,
    amount: SenderAmount,
    recipient: Option<RecipientWallet>,
    settlement_method: SettlementMethod,
    fees: FeeState,
}

impl WithRecipientWallet {
    pub fn is_intra_ledger(&self) -> bool {
        self.settlement_method == SettlementMethod::IntraLedger
    }

    pub fn settlement_method(&self) -> SettlementMethod {
        self.settlement_method
    }

    /// Network payments are always settled in btc
    pub fn recipient_currency(&self) -> WalletCurrency {
        self.recipient
            .as_ref()
            .map(|recipient| recipient.currency)
            .unwrap_or(WalletCurrency::Btc)
    }

    pub fn is_conversion_required(&self) -> bool {
        self.sender.currency != self.recipient_currency()
    }

    /// Btc amount, if already known without conversion
    pub fn btc_payment_amount(&self) -> Option<BtcPaymentAmount> {
        match self.amount {
            SenderAmount::Btc(btc) => Some(btc),
            SenderAmount::Usd(_) => None,
        }
    }

    /// Usd amount, if already known without conversion
    pub fn usd_payment_amount(&self) -> Option<UsdPaymentAmount> {
        match self.amount {
            SenderAmount::Usd(usd) => Some(usd),
            SenderAmount::Btc(_) => self.known_recipient_usd_amount(),
        }
    }

    fn known_recipient_usd_amount(&self) -> Option<UsdPaymentAmount> {
        self.recipient
            .as_ref()
            .filter(|recipient| recipient.currency == WalletCurrency::Usd)
            .and_then(|recipient| recipient.usd_payment_amount)
    }

    /// Resolve the missing currency and produce the flow
    ///
    /// `dealer` quotes spread prices for cross-currency transfers. Transfers
    /// that stay in one currency use the configured mid-price converter.
    pub async fn with_conversion(self, dealer: &dyn PriceConverter) -> Result<PaymentFlow> {
        let (btc_payment_amount, usd_payment_amount) = if self.is_conversion_required() {
            match self.amount {
                SenderAmount::Btc(btc) => match self.known_recipient_usd_amount() {
                    Some(usd) => (btc, usd),
                    None => (btc, dealer.usd_from_btc(btc).await?),
                },
                SenderAmount::Usd(usd) => (dealer.btc_from_usd(usd).await?, usd),
            }
        } else {
            let mid_price = self.base.config.mid_price.as_ref();
            match self.amount {
                SenderAmount::Btc(btc) => (btc, mid_price.usd_from_btc(btc).await?),
                SenderAmount::Usd(usd) => (mid_price.btc_from_usd(usd).await?, usd),
            }
        };

        let protocol_fees = match self.fees {
            FeeState::Known(fees) => fees,
            FeeState::BtcOnly(btc) if btc.is_zero() => ProtocolFees {
                btc,
                usd: UsdPaymentAmount::zero(),
            },
            FeeState::BtcOnly(btc) => {
                let ratio = PriceRatio::new(usd_payment_amount, btc_payment_amount)?;
                ProtocolFees {
                    btc,
                    usd: ratio.convert_from_btc_to_ceil(btc),
                }
            }
        };

        debug!(
            sender_wallet_id = %self.sender.id,
            settlement_method = ?self.settlement_method,
            btc = %btc_payment_amount,
            usd = %usd_payment_amount,
            "Built payment flow"
        );

        let destination = self.base.destination;
        let (recipient_wallet_id, recipient_wallet_currency, recipient_username, recipient_pubkey) =
            match self.recipient {
                Some(recipient) => (
                    Some(recipient.id),
                    Some(recipient.currency),
                    recipient.username,
                    recipient.pubkey.or(self.base.recipient_pubkey),
                ),
                None => (None, None, None, self.base.recipient_pubkey),
            };

        Ok(PaymentFlow {
            sender_wallet_id: self.sender.id,
            sender_wallet_currency: self.sender.currency,
            recipient_wallet_id,
            recipient_wallet_currency,
            recipient_pubkey,
            recipient_username,
            payment_initiation_method: destination.initiation_method(),
            destination,
            description_from_invoice: self.base.description,
            input_amount: self.amount.amount(),
            btc_payment_amount,
            usd_payment_amount,
            btc_protocol_fee: protocol_fees.btc,
            usd_protocol_fee: protocol_fees.usd,
            settlement_method: self.settlement_method,
            created_at: Utc::now(),
            payment_sent_and_pending: false,
        })
    }
}
