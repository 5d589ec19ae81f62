//! Price ratio between btc and usd
//!
//! A ratio is built from two amounts that represent the same value. It is the
//! only way to turn a btc amount into a usd amount or back. Each conversion
//! names its rounding direction.

use ledgerflow_types::{BtcPaymentAmount, LedgerFlowError, Result, UsdPaymentAmount};
use serde::{Deserialize, Serialize};

/// Ratio of a matched usd/btc pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRatio {
    usd: UsdPaymentAmount,
    btc: BtcPaymentAmount,
}

fn div_floor(numerator: u128, denominator: u128) -> u128 {
    numerator / denominator
}

fn div_ceil(numerator: u128, denominator: u128) -> u128 {
    numerator.div_ceil(denominator)
}

fn div_round_half_up(numerator: u128, denominator: u128) -> u128 {
    let quotient = numerator / denominator;
    if 2 * (numerator % denominator) >= denominator {
        quotient + 1
    } else {
        quotient
    }
}

fn saturate(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

impl PriceRatio {
    /// Build a ratio from a usd amount and the btc amount it is worth
    pub fn new(usd: UsdPaymentAmount, btc: BtcPaymentAmount) -> Result<Self> {
        if btc.is_zero() {
            return Err(LedgerFlowError::ZeroAmountPriceRatio {
                side: "btc".to_string(),
            });
        }
        Ok(Self { usd, btc })
    }

    pub fn usd(&self) -> UsdPaymentAmount {
        self.usd
    }

    pub fn btc(&self) -> BtcPaymentAmount {
        self.btc
    }

    fn btc_to_usd_numerator(&self, convert: BtcPaymentAmount) -> u128 {
        convert.amount() as u128 * self.usd.amount() as u128
    }

    /// Btc to usd, rounding half up
    pub fn convert_from_btc(&self, convert: BtcPaymentAmount) -> UsdPaymentAmount {
        let cents = div_round_half_up(self.btc_to_usd_numerator(convert), self.btc.amount() as u128);
        UsdPaymentAmount::new(saturate(cents))
    }

    /// Btc to usd, rounding down. Used for amounts the protocol pays out.
    pub fn convert_from_btc_to_floor(&self, convert: BtcPaymentAmount) -> UsdPaymentAmount {
        let cents = div_floor(self.btc_to_usd_numerator(convert), self.btc.amount() as u128);
        UsdPaymentAmount::new(saturate(cents))
    }

    /// Btc to usd, rounding up. Used for fees the protocol charges.
    pub fn convert_from_btc_to_ceil(&self, convert: BtcPaymentAmount) -> UsdPaymentAmount {
        let cents = div_ceil(self.btc_to_usd_numerator(convert), self.btc.amount() as u128);
        UsdPaymentAmount::new(saturate(cents))
    }

    fn usd_to_btc(
        &self,
        convert: UsdPaymentAmount,
        round: fn(u128, u128) -> u128,
    ) -> Result<BtcPaymentAmount> {
        if convert.is_zero() {
            return Ok(BtcPaymentAmount::zero());
        }
        if self.usd.is_zero() {
            return Err(LedgerFlowError::ZeroAmountPriceRatio {
                side: "usd".to_string(),
            });
        }
        let numerator = convert.amount() as u128 * self.btc.amount() as u128;
        Ok(BtcPaymentAmount::new(saturate(round(numerator, self.usd.amount() as u128))))
    }

    /// Usd to btc, rounding half up
    pub fn convert_from_usd(&self, convert: UsdPaymentAmount) -> Result<BtcPaymentAmount> {
        self.usd_to_btc(convert, div_round_half_up)
    }

    /// Usd to btc, rounding up. Used for fees the protocol charges.
    pub fn convert_from_usd_to_ceil(&self, convert: UsdPaymentAmount) -> Result<BtcPaymentAmount> {
        self.usd_to_btc(convert, div_ceil)
    }

    /// Usd to btc, rounding down. Used for amounts the protocol may pay back.
    pub fn convert_from_usd_to_floor(&self, convert: UsdPaymentAmount) -> Result<BtcPaymentAmount> {
        self.usd_to_btc(convert, div_floor)
    }

    /// Cents per satoshi, for display only
    pub fn usd_per_sat(&self) -> f64 {
        self.usd.amount() as f64 / self.btc.amount() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(cents: u64, sats: u64) -> PriceRatio {
        PriceRatio::new(UsdPaymentAmount::new(cents), BtcPaymentAmount::new(sats)).unwrap()
    }

    #[test]
    fn test_zero_btc_side_is_rejected() {
        let result = PriceRatio::new(UsdPaymentAmount::new(100), BtcPaymentAmount::zero());
        assert!(matches!(result, Err(LedgerFlowError::ZeroAmountPriceRatio { .. })));
    }

    #[test]
    fn test_zero_usd_side_only_fails_usd_conversions() {
        let r = ratio(0, 1_000);
        assert_eq!(r.convert_from_btc_to_ceil(BtcPaymentAmount::new(500)), UsdPaymentAmount::zero());
        assert!(r.convert_from_usd(UsdPaymentAmount::new(1)).is_err());
        assert_eq!(r.convert_from_usd(UsdPaymentAmount::zero()).unwrap(), BtcPaymentAmount::zero());
    }

    #[test]
    fn test_rounding_directions() {
        // 3 cents per 1000 sats: 500 sats is worth 1.5 cents
        let r = ratio(3, 1_000);
        let fee = BtcPaymentAmount::new(500);
        assert_eq!(r.convert_from_btc_to_floor(fee).amount(), 1);
        assert_eq!(r.convert_from_btc(fee).amount(), 2);
        assert_eq!(r.convert_from_btc_to_ceil(fee).amount(), 2);

        // 400 sats is worth 1.2 cents
        let fee = BtcPaymentAmount::new(400);
        assert_eq!(r.convert_from_btc(fee).amount(), 1);
        assert_eq!(r.convert_from_btc_to_ceil(fee).amount(), 2);
    }

    #[test]
    fn test_fee_conversion_is_always_ceiling() {
        let ratios = [ratio(1, 3_000), ratio(2_000, 50_000), ratio(7, 13), ratio(123_456, 7_890_123)];
        for r in ratios {
            for sats in [0u64, 1, 2, 99, 380, 500, 12_345, 1_000_003] {
                let exact = sats as u128 * r.usd().amount() as u128;
                let btc = r.btc().amount() as u128;
                let expected = (exact + btc - 1) / btc;
                assert_eq!(
                    r.convert_from_btc_to_ceil(BtcPaymentAmount::new(sats)).amount() as u128,
                    expected,
                    "ceil({} * {}/{})",
                    sats,
                    r.usd().amount(),
                    btc
                );
            }
        }
    }

    #[test]
    fn test_usd_round_trip_within_one_cent() {
        // 1 cent buys 3,333 sats; sats are the finer unit
        let r = ratio(3, 10_000);
        for cents in [1u64, 2, 10, 99, 1_000, 123_457] {
            let usd = UsdPaymentAmount::new(cents);
            let btc = r.convert_from_usd(usd).unwrap();
            let back = r.convert_from_btc(btc);
            assert!(back.amount().abs_diff(cents) <= 1, "{} -> {} -> {}", cents, btc, back);
        }
    }

    #[test]
    fn test_btc_round_trip_with_exact_ratio() {
        let r = ratio(2, 1_000);
        for sats in [500u64, 1_000, 50_000] {
            let usd = r.convert_from_btc(BtcPaymentAmount::new(sats));
            let back = r.convert_from_usd(usd).unwrap();
            assert!(back.amount().abs_diff(sats) <= 1);
        }
    }

    #[test]
    fn test_usd_to_btc_ceiling() {
        // 7 cents per 10 sats: 1 cent is 1.43 sats
        let r = ratio(7, 10);
        assert_eq!(r.convert_from_usd(UsdPaymentAmount::new(1)).unwrap().amount(), 1);
        assert_eq!(r.convert_from_usd_to_ceil(UsdPaymentAmount::new(1)).unwrap().amount(), 2);
        assert_eq!(r.convert_from_usd_to_floor(UsdPaymentAmount::new(3)).unwrap().amount(), 4);
    }
}
