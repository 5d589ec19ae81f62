//! Wallet descriptors

use serde::{Deserialize, Serialize};

use crate::{Pubkey, UsdPaymentAmount, Username, WalletCurrency, WalletId};

/// The parts of a wallet payment logic needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDescriptor {
    pub id: WalletId,
    pub currency: WalletCurrency,
}

impl WalletDescriptor {
    pub fn new(id: WalletId, currency: WalletCurrency) -> Self {
        Self { id, currency }
    }
}

/// Recipient of a payment on this ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientWallet {
    pub id: WalletId,
    pub currency: WalletCurrency,
    pub pubkey: Option<Pubkey>,
    pub username: Option<Username>,
    /// Usd amount fixed by the recipient's invoice, if any
    pub usd_payment_amount: Option<UsdPaymentAmount>,
}

impl From<WalletDescriptor> for RecipientWallet {
    fn from(wallet: WalletDescriptor) -> Self {
        Self {
            id: wallet.id,
            currency: wallet.currency,
            pubkey: None,
            username: None,
            usd_payment_amount: None,
        }
    }
}
