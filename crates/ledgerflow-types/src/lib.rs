//! LedgerFlow Types - Canonical domain types for pending payment reconciliation
//!
//! This crate contains the foundational types shared by every LedgerFlow crate
//! and has no dependencies on them:
//!
//! - Identity types (WalletId, JournalId, PaymentHash, ...)
//! - Wallet currencies and currency-tagged amounts
//! - Ledger transaction model
//! - Settlement network lookup types
//! - The workspace error type
//!
//! # Invariants
//!
//! 1. Amounts are never negative
//! 2. Btc and usd amounts cannot be mixed without a price ratio
//! 3. Ledger entries are append-only; settling or reverting adds entries

pub mod identity;
pub mod currency;
pub mod amount;
pub mod transaction;
pub mod wallet;
pub mod lightning;
pub mod error;

pub use identity::*;
pub use currency::*;
pub use amount::*;
pub use transaction::*;
pub use wallet::*;
pub use lightning::*;
pub use error::*;

/// Version of the LedgerFlow types schema
pub const TYPES_VERSION: &str = "0.1.0";
