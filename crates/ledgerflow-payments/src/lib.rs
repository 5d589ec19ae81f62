//! LedgerFlow Payments - Building and converting payment flows
//!
//! A payment flow is the currency-resolved description of one transfer. This
//! crate provides:
//!
//! - `PriceRatio`: btc/usd conversion with an explicit rounding direction
//! - `PriceConverter`: the seam to the dealer price service
//! - `PaymentFlowBuilder`: staged construction of a `PaymentFlow`
//! - Protocol fee schedule and fee reimbursement arithmetic
//! - The payment flow state cache
//!
//! # Fee Rounding
//!
//! Fees charged by the protocol are converted rounding up. Amounts refunded
//! by the protocol are converted rounding down.

pub mod price_ratio;
pub mod conversion;
pub mod fees;
pub mod flow;
pub mod builder;
pub mod flow_state;

pub use price_ratio::*;
pub use conversion::*;
pub use fees::*;
pub use flow::*;
pub use builder::{
    PaymentFlowBuilder, PaymentFlowBuilderConfig, SenderAmount, WithAmount, WithAmountResultExt,
    WithDestination, WithDestinationResultExt, WithRecipientWallet, WithRecipientWalletResultExt,
    WithSenderWallet, WithSenderWalletResultExt,
};
pub use flow_state::*;
