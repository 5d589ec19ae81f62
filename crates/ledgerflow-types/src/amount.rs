//! Currency-tagged payment amounts
//!
//! `PaymentAmount<C>` holds a non-negative count of the smallest unit of `C`.
//! Arithmetic is only defined between amounts with the same tag, so adding
//! sats to cents does not compile. Crossing currencies goes through a
//! `PriceRatio`.

use crate::{Btc, Denomination, LedgerFlowError, Result, Usd, WalletCurrency};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Add;

/// Amount in the smallest unit of currency `C`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PaymentAmount<C: Denomination> {
    amount: u64,
    currency: C,
}

/// Amount in satoshis
pub type BtcPaymentAmount = PaymentAmount<Btc>;

/// Amount in cents
pub type UsdPaymentAmount = PaymentAmount<Usd>;

impl<C: Denomination> PaymentAmount<C> {
    pub fn new(amount: u64) -> Self {
        Self {
            amount,
            currency: C::default(),
        }
    }

    pub fn zero() -> Self {
        Self::new(0)
    }

    /// Raw count of the smallest unit
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Runtime currency tag
    pub fn currency(&self) -> WalletCurrency {
        C::CURRENCY
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.amount
            .checked_add(other.amount)
            .map(Self::new)
            .ok_or(LedgerFlowError::AmountOverflow)
    }

    /// `None` when `other` is larger; amounts never go negative
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.amount.checked_sub(other.amount).map(Self::new)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self::new(self.amount.saturating_sub(other.amount))
    }
}

impl<C: Denomination> Add for PaymentAmount<C> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.amount.saturating_add(other.amount))
    }
}

impl<C: Denomination> fmt::Display for PaymentAmount<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, C::CURRENCY.unit())
    }
}

#[derive(Serialize, Deserialize)]
struct RawPaymentAmount {
    amount: u64,
    currency: WalletCurrency,
}

impl<C: Denomination> Serialize for PaymentAmount<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        RawPaymentAmount {
            amount: self.amount,
            currency: C::CURRENCY,
        }
        .serialize(serializer)
    }
}

impl<'de, C: Denomination> Deserialize<'de> for PaymentAmount<C> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawPaymentAmount::deserialize(deserializer)?;
        if raw.currency != C::CURRENCY {
            return Err(D::Error::custom(format!(
                "expected {} amount, got {}",
                C::CURRENCY,
                raw.currency
            )));
        }
        Ok(Self::new(raw.amount))
    }
}

/// Validate a raw amount (as received from an API) for currency `C`
pub fn checked_to_payment_amount<C: Denomination>(unchecked: f64) -> Result<PaymentAmount<C>> {
    let currency = C::CURRENCY.code();
    if !unchecked.is_finite() {
        return Err(LedgerFlowError::validation(currency, "amount is not a number"));
    }
    if unchecked.fract() != 0.0 {
        return Err(LedgerFlowError::validation(
            currency,
            format!("amount must be a whole number of {}", C::CURRENCY.unit()),
        ));
    }
    if unchecked < 0.0 {
        return Err(LedgerFlowError::validation(currency, "amount is negative"));
    }
    if unchecked > C::MAX_AMOUNT as f64 {
        return Err(LedgerFlowError::validation(
            currency,
            format!("amount exceeds maximum of {}", C::MAX_AMOUNT),
        ));
    }
    Ok(PaymentAmount::new(unchecked as u64))
}

pub fn checked_to_btc_payment_amount(unchecked: f64) -> Result<BtcPaymentAmount> {
    checked_to_payment_amount::<Btc>(unchecked)
}

pub fn checked_to_usd_payment_amount(unchecked: f64) -> Result<UsdPaymentAmount> {
    checked_to_payment_amount::<Usd>(unchecked)
}
