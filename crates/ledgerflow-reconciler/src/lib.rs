//! LedgerFlow Reconciler - Finalizes pending network payments
//!
//! A payment sent over the settlement network sits on the ledger as a pending
//! entry until the network reports its outcome. The reconciler polls for those
//! outcomes and:
//!
//! - settles the entry and refunds any unused routing fee, or
//! - reverts the entry when the payment failed
//!
//! # Invariants
//!
//! 1. A payment hash is finalized at most once, across workers and processes
//!    sharing the lock service
//! 2. Transient failures leave the payment pending for the next pass
//! 3. A failure on one payment never stops its siblings

pub mod config;
pub mod outcome;
pub mod reimburse;
pub mod reconstruct;
pub mod reconciler;

pub use config::*;
pub use outcome::*;
pub use reimburse::*;
pub use reconstruct::*;
pub use reconciler::*;
