//! Price conversion seam
//!
//! The dealer price service quotes two ways: spread-adjusted prices for
//! transfers that actually cross currencies, and mid prices for transfers
//! that stay in one currency and only need the other as a shadow amount.
//! Both are exposed through the same `PriceConverter` trait.

use async_trait::async_trait;
use ledgerflow_types::{BtcPaymentAmount, Result, UsdPaymentAmount};

use crate::PriceRatio;

/// Converts amounts between btc and usd
#[async_trait]
pub trait PriceConverter: Send + Sync {
    async fn usd_from_btc(&self, btc: BtcPaymentAmount) -> Result<UsdPaymentAmount>;
    async fn btc_from_usd(&self, usd: UsdPaymentAmount) -> Result<BtcPaymentAmount>;
}

const BPS_DENOMINATOR: u64 = 10_000;

/// Converter quoting a fixed price, optionally with a dealer spread
#[derive(Debug, Clone, Copy)]
pub struct FixedPriceConverter {
    ratio: PriceRatio,
    spread_bps: u64,
}

impl FixedPriceConverter {
    /// Mid price: `usd` is worth exactly `btc`
    pub fn mid_price(ratio: PriceRatio) -> Self {
        Self {
            ratio,
            spread_bps: 0,
        }
    }

    /// Dealer price with the spread taken from the customer on every conversion
    pub fn with_spread_bps(ratio: PriceRatio, spread_bps: u64) -> Self {
        Self {
            ratio,
            spread_bps: spread_bps.min(BPS_DENOMINATOR),
        }
    }

    pub fn ratio(&self) -> PriceRatio {
        self.ratio
    }

    fn apply_spread(&self, amount: u64) -> u64 {
        if self.spread_bps == 0 {
            return amount;
        }
        let kept = amount as u128 * (BPS_DENOMINATOR - self.spread_bps) as u128 / BPS_DENOMINATOR as u128;
        kept as u64
    }
}

#[async_trait]
impl PriceConverter for FixedPriceConverter {
    async fn usd_from_btc(&self, btc: BtcPaymentAmount) -> Result<UsdPaymentAmount> {
        if self.spread_bps == 0 {
            return Ok(self.ratio.convert_from_btc(btc));
        }
        let usd = self.ratio.convert_from_btc_to_floor(btc);
        Ok(UsdPaymentAmount::new(self.apply_spread(usd.amount())))
    }

    async fn btc_from_usd(&self, usd: UsdPaymentAmount) -> Result<BtcPaymentAmount> {
        let btc = self.ratio.convert_from_usd(usd)?;
        Ok(BtcPaymentAmount::new(self.apply_spread(btc.amount())))
    }
}
