//! Currency types for LedgerFlow
//!
//! `WalletCurrency` is the runtime tag stored with wallets and ledger entries.
//! `Btc` and `Usd` are the compile-time tags carried by `PaymentAmount<C>`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency a wallet is denominated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletCurrency {
    /// Bitcoin, counted in satoshis
    Btc,
    /// US dollar, counted in cents
    Usd,
}

impl WalletCurrency {
    /// Code used in logs and serialized amounts
    pub fn code(&self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Usd => "USD",
        }
    }

    /// Name of the smallest unit
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Btc => "sats",
            Self::Usd => "cents",
        }
    }
}

impl fmt::Display for WalletCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Compile-time currency tag
pub trait Denomination:
    Copy + Clone + fmt::Debug + Default + PartialEq + Eq + Send + Sync + 'static
{
    /// Runtime tag matching this type
    const CURRENCY: WalletCurrency;

    /// Largest amount accepted from raw input, in the smallest unit
    const MAX_AMOUNT: u64;
}

/// Bitcoin tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Btc;

/// US dollar tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Usd;

/// 21 million BTC in satoshis
pub const MAX_SATS: u64 = 21_000_000 * 100_000_000;

/// Ten billion dollars in cents
pub const MAX_CENTS: u64 = 1_000_000_000_000;

impl Denomination for Btc {
    const CURRENCY: WalletCurrency = WalletCurrency::Btc;
    const MAX_AMOUNT: u64 = MAX_SATS;
}

impl Denomination for Usd {
    const CURRENCY: WalletCurrency = WalletCurrency::Usd;
    const MAX_AMOUNT: u64 = MAX_CENTS;
}
