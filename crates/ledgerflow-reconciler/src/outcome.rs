//! Reconciliation outcomes

use serde::Serialize;

use ledgerflow_payments::Reimbursement;
use ledgerflow_types::Result;

/// What happened to one pending payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The network has not decided yet; retried next pass
    StillPending,
    /// Another run finalized the payment first
    AlreadyProcessed,
    /// Settled on the ledger, with the fee refund if one was owed
    Settled { reimbursed: Option<Reimbursement> },
    /// Failed on the network and voided on the ledger
    Reverted,
}

/// Totals for one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Listing wallets failed; nothing was processed
    pub aborted: bool,
    pub wallets_processed: usize,
    pub wallets_failed: usize,
    pub payments_settled: usize,
    pub payments_reverted: usize,
    pub payments_still_pending: usize,
    pub payments_already_processed: usize,
    pub payments_failed: usize,
    pub fees_reimbursed: usize,
}

impl ReconciliationReport {
    pub fn aborted() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }

    /// Count the results of one wallet
    pub fn record_wallet(&mut self, results: &[Result<PaymentOutcome>]) {
        self.wallets_processed += 1;
        for result in results {
            match result {
                Ok(PaymentOutcome::StillPending) => self.payments_still_pending += 1,
                Ok(PaymentOutcome::AlreadyProcessed) => self.payments_already_processed += 1,
                Ok(PaymentOutcome::Settled { reimbursed }) => {
                    self.payments_settled += 1;
                    if reimbursed.is_some() {
                        self.fees_reimbursed += 1;
                    }
                }
                Ok(PaymentOutcome::Reverted) => self.payments_reverted += 1,
                Err(_) => self.payments_failed += 1,
            }
        }
    }

    pub fn record_wallet_failure(&mut self) {
        self.wallets_failed += 1;
    }

    pub fn merge(&mut self, other: ReconciliationReport) {
        self.aborted |= other.aborted;
        self.wallets_processed += other.wallets_processed;
        self.wallets_failed += other.wallets_failed;
        self.payments_settled += other.payments_settled;
        self.payments_reverted += other.payments_reverted;
        self.payments_still_pending += other.payments_still_pending;
        self.payments_already_processed += other.payments_already_processed;
        self.payments_failed += other.payments_failed;
        self.fees_reimbursed += other.fees_reimbursed;
    }
}
