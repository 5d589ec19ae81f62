//! Chaining over builder results
//!
//! Every stage call is available on `Result<Stage>` as well. An `Err` is
//! passed along untouched, so a chain can be written end to end and checked
//! once at the end.

use async_trait::async_trait;

use ledgerflow_types::{BtcPaymentAmount, RecipientWallet, Result, UsdPaymentAmount, WalletDescriptor};

use super::{WithAmount, WithDestination, WithRecipientWallet, WithSenderWallet};
use crate::{PaymentFlow, PriceConverter};

pub trait WithDestinationResultExt {
    fn with_description(self, description: impl Into<String>) -> Result<WithDestination>;
    fn with_sender_wallet(self, sender: WalletDescriptor) -> Result<WithSenderWallet>;
}

impl WithDestinationResultExt for Result<WithDestination> {
    fn with_description(self, description: impl Into<String>) -> Result<WithDestination> {
        self.map(|stage| stage.with_description(description))
    }

    fn with_sender_wallet(self, sender: WalletDescriptor) -> Result<WithSenderWallet> {
        self.map(|stage| stage.with_sender_wallet(sender))
    }
}

pub trait WithSenderWalletResultExt {
    fn with_amount(self, raw_amount: f64) -> Result<WithAmount>;
}

impl WithSenderWalletResultExt for Result<WithSenderWallet> {
    fn with_amount(self, raw_amount: f64) -> Result<WithAmount> {
        self.and_then(|stage| stage.with_amount(raw_amount))
    }
}

pub trait WithAmountResultExt {
    fn with_recipient_wallet(self, recipient: impl Into<RecipientWallet>) -> Result<WithRecipientWallet>;
    fn without_recipient_wallet(self) -> Result<WithRecipientWallet>;
}

impl WithAmountResultExt for Result<WithAmount> {
    fn with_recipient_wallet(self, recipient: impl Into<RecipientWallet>) -> Result<WithRecipientWallet> {
        self.and_then(|stage| stage.with_recipient_wallet(recipient))
    }

    fn without_recipient_wallet(self) -> Result<WithRecipientWallet> {
        self.map(WithAmount::without_recipient_wallet)
    }
}

#[async_trait]
pub trait WithRecipientWalletResultExt {
    fn is_intra_ledger(&self) -> Result<bool>;
    fn btc_payment_amount(&self) -> Result<Option<BtcPaymentAmount>>;
    fn usd_payment_amount(&self) -> Result<Option<UsdPaymentAmount>>;
    async fn with_conversion(self, dealer: &dyn PriceConverter) -> Result<PaymentFlow>;
}

#[async_trait]
impl WithRecipientWalletResultExt for Result<WithRecipientWallet> {
    fn is_intra_ledger(&self) -> Result<bool> {
        self.as_ref().map(WithRecipientWallet::is_intra_ledger).map_err(Clone::clone)
    }

    fn btc_payment_amount(&self) -> Result<Option<BtcPaymentAmount>> {
        self.as_ref().map(WithRecipientWallet::btc_payment_amount).map_err(Clone::clone)
    }

    fn usd_payment_amount(&self) -> Result<Option<UsdPaymentAmount>> {
        self.as_ref().map(WithRecipientWallet::usd_payment_amount).map_err(Clone::clone)
    }

    async fn with_conversion(self, dealer: &dyn PriceConverter) -> Result<PaymentFlow> {
        match self {
            Ok(stage) => stage.with_conversion(dealer).await,
            Err(err) => Err(err),
        }
    }
}
