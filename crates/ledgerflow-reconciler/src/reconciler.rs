//! Pending payment reconciler
//!
//! For every wallet with pending network payments, ask the settlement network
//! what happened and finalize or revert the ledger entry. Wallets run in
//! parallel on a fixed pool of workers; payments within a wallet run one at a
//! time. Finalization of a payment hash happens under its lock, after an
//! idempotency check, so repeated or concurrent runs finalize it once.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use ledgerflow_ledger::{LedgerStore, TransactionMetadata};
use ledgerflow_lock::{with_payment_hash_lock, DistributedLock};
use ledgerflow_payments::{PaymentFlow, PaymentFlowStateRepository, UpdatePendingFlowArgs};
use ledgerflow_settlement::{LookupPaymentArgs, PaymentLookup, PaymentStatus, SettlementNetwork};
use ledgerflow_types::{LedgerFlowError, PaymentHash, PendingPayment, Result, WalletId};
use ledgerflow_wallet::WalletRepository;

use crate::{
    FeeReimburser, LedgerReconstructor, PaymentOutcome, ReconcilerSettings, ReconciliationReport,
    ReimburseFeeArgs,
};

/// Collaborators the reconciler talks to
#[derive(Clone)]
pub struct ReconcilerServices {
    pub ledger: Arc<dyn LedgerStore>,
    pub lock: Arc<dyn DistributedLock>,
    pub network: Arc<dyn SettlementNetwork>,
    pub wallets: Arc<dyn WalletRepository>,
    pub flow_state: Arc<dyn PaymentFlowStateRepository>,
    pub reimburser: Arc<dyn FeeReimburser>,
}

/// Resolves pending network payments to a terminal ledger state
#[derive(Clone)]
pub struct PendingPaymentReconciler {
    services: ReconcilerServices,
    reconstructor: LedgerReconstructor,
    settings: ReconcilerSettings,
}

impl PendingPaymentReconciler {
    pub fn new(services: ReconcilerServices, settings: ReconcilerSettings) -> Self {
        let reconstructor = LedgerReconstructor::new(Arc::clone(&services.ledger), Arc::clone(&services.network));
        Self {
            services,
            reconstructor,
            settings,
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Run one pass over every wallet with pending payments
    ///
    /// A failure to list wallets aborts the pass; the next pass starts over.
    pub async fn reconcile_all_pending_payments(&self) -> ReconciliationReport {
        let wallet_ids = match self.services.ledger.list_wallet_ids_with_pending_payments().await {
            Ok(wallet_ids) => wallet_ids,
            Err(e) => {
                error!(error = %e, "Could not list wallets with pending payments, aborting run");
                return ReconciliationReport::aborted();
            }
        };
        if wallet_ids.is_empty() {
            debug!("No wallets with pending payments");
            return ReconciliationReport::default();
        }

        let workers = self.settings.workers.clamp(1, wallet_ids.len());
        info!(wallets = wallet_ids.len(), workers, "Reconciling pending payments");

        let (tx, rx) = flume::unbounded::<WalletId>();
        for wallet_id in wallet_ids {
            // The receiver is alive until the workers finish
            let _ = tx.send(wallet_id);
        }
        drop(tx);

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let rx = rx.clone();
                let reconciler = self.clone();
                tokio::spawn(async move {
                    let mut report = ReconciliationReport::default();
                    while let Ok(wallet_id) = rx.recv_async().await {
                        trace!(worker, wallet_id = %wallet_id, "Worker picked up wallet");
                        match reconciler.reconcile_pending_payments_for_wallet(&wallet_id).await {
                            Ok(results) => report.record_wallet(&results),
                            Err(e) => {
                                error!(worker, wallet_id = %wallet_id, error = %e, "Could not reconcile wallet");
                                report.record_wallet_failure();
                            }
                        }
                    }
                    trace!(worker, "Worker finished");
                    report
                })
            })
            .collect();

        let mut report = ReconciliationReport::default();
        for joined in join_all(handles).await {
            match joined {
                Ok(worker_report) => report.merge(worker_report),
                Err(e) => error!(error = %e, "Reconciliation worker panicked"),
            }
        }

        info!(
            wallets_processed = report.wallets_processed,
            wallets_failed = report.wallets_failed,
            settled = report.payments_settled,
            reverted = report.payments_reverted,
            still_pending = report.payments_still_pending,
            failed = report.payments_failed,
            "Reconciliation pass finished"
        );
        report
    }

    /// Reconcile a wallet's pending payments one after another
    ///
    /// Per-payment failures are collected, not propagated. The error case is
    /// reserved for failing to read the wallet's pending payments.
    pub async fn reconcile_pending_payments_for_wallet(
        &self,
        wallet_id: &WalletId,
    ) -> Result<Vec<Result<PaymentOutcome>>> {
        let count = self.services.ledger.get_pending_payments_count(wallet_id).await?;
        if count == 0 {
            trace!(wallet_id = %wallet_id, "No pending payments");
            return Ok(Vec::new());
        }

        let pending_payments = self.services.ledger.list_pending_payments(wallet_id).await?;
        debug!(wallet_id = %wallet_id, count = pending_payments.len(), "Reconciling wallet");

        let mut results = Vec::with_capacity(pending_payments.len());
        for pending_payment in &pending_payments {
            results.push(self.reconcile_pending_payment(pending_payment).await);
        }
        Ok(results)
    }

    /// Reconcile a single pending payment
    pub async fn reconcile_pending_payment(&self, pending_payment: &PendingPayment) -> Result<PaymentOutcome> {
        let Some(payment_hash) = pending_payment.payment_hash.clone() else {
            let e = LedgerFlowError::inconsistent_data("paymentHash missing from payment transaction");
            error!(journal_id = %pending_payment.journal_id, error = %e, "Pending payment is unusable");
            return Err(e);
        };
        let Some(pubkey) = pending_payment.pubkey.clone() else {
            let e = LedgerFlowError::inconsistent_data("pubkey missing from payment transaction");
            error!(payment_hash = %payment_hash, error = %e, "Pending payment is unusable");
            return Err(e);
        };

        let span = info_span!(
            "pending_payment",
            payment_hash = %payment_hash,
            wallet_id = ?pending_payment.wallet_id,
            protocol = "lightning"
        );

        async move {
            let lookup = self
                .services
                .network
                .lookup_payment(LookupPaymentArgs {
                    pubkey: Some(pubkey),
                    payment_hash: payment_hash.clone(),
                })
                .await
                .map_err(|e| {
                    error!(error = %e, "Issue fetching payment");
                    e
                })?;

            if !lookup.status.is_terminal() {
                trace!("Payment still pending on the network");
                return Ok(PaymentOutcome::StillPending);
            }

            with_payment_hash_lock(self.services.lock.as_ref(), &payment_hash, || {
                self.finalize(pending_payment, &payment_hash, &lookup)
            })
            .await
            .map_err(|e| {
                if matches!(e, LedgerFlowError::LockAcquisitionTimeout { .. } | LedgerFlowError::LockService { .. }) {
                    error!(error = %e, "Could not lock payment hash");
                }
                e
            })
        }
        .instrument(span)
        .await
    }

    /// Critical section, run while holding the payment hash lock
    async fn finalize(
        &self,
        pending_payment: &PendingPayment,
        payment_hash: &PaymentHash,
        lookup: &PaymentLookup,
    ) -> Result<PaymentOutcome> {
        let ledger = &self.services.ledger;

        let recorded = ledger.is_finalized(payment_hash).await.map_err(|e| {
            error!(error = %e, "Could not query pending transaction");
            e
        })?;
        if recorded {
            info!("Payment has already been processed");
            return Ok(PaymentOutcome::AlreadyProcessed);
        }

        let flow = self.resolve_payment_flow(pending_payment, payment_hash).await?;

        ledger.settle_pending(payment_hash).await.map_err(|e| {
            error!(error = %e, "No transaction to update");
            e
        })?;

        let wallet = self.services.wallets.find_by_id(&flow.sender_wallet_id).await?;

        match lookup.status {
            PaymentStatus::Settled => {
                info!(success = true, wallet_id = %wallet.id, "Payment has been confirmed");

                if let Some(pre_image) = lookup.revealed_pre_image() {
                    let metadata = TransactionMetadata {
                        revealed_pre_image: Some(pre_image.clone()),
                    };
                    if let Err(e) = ledger.update_metadata(payment_hash, metadata).await {
                        warn!(error = %e, "Could not record revealed pre-image");
                    }
                }

                if pending_payment.fee_known_in_advance {
                    return Ok(PaymentOutcome::Settled { reimbursed: None });
                }

                let reimbursed = self
                    .services
                    .reimburser
                    .reimburse(ReimburseFeeArgs {
                        flow,
                        journal_id: pending_payment.journal_id.clone(),
                        actual_fee: lookup.rounded_up_fee(),
                        revealed_pre_image: lookup.revealed_pre_image().cloned(),
                        payment_amount: pending_payment.payment_amount(),
                    })
                    .await
                    .map_err(|e| {
                        error!(error = %e, "Fee reimbursement failed");
                        e
                    })?;
                Ok(PaymentOutcome::Settled { reimbursed })
            }
            PaymentStatus::Failed => {
                warn!(success = false, wallet_id = %wallet.id, "Payment has failed, reverting transaction");

                if let Err(e) = ledger.revert_payment(&pending_payment.journal_id, payment_hash).await {
                    error!(
                        fatal = true,
                        journal_id = %pending_payment.journal_id,
                        error = %e,
                        "Error voiding payment entry, ledger and settlement network are inconsistent"
                    );
                    return Err(e);
                }
                Ok(PaymentOutcome::Reverted)
            }
            PaymentStatus::Pending => Ok(PaymentOutcome::StillPending),
        }
    }

    /// Cached flow if it is still there, otherwise rebuilt from the ledger
    async fn resolve_payment_flow(
        &self,
        pending_payment: &PendingPayment,
        payment_hash: &PaymentHash,
    ) -> Result<PaymentFlow> {
        if let Some(sender_wallet_id) = pending_payment.wallet_id.clone() {
            let cached = self
                .services
                .flow_state
                .update_pending_lightning_payment_flow(UpdatePendingFlowArgs {
                    sender_wallet_id,
                    payment_hash: payment_hash.clone(),
                    input_amount: pending_payment.input_amount(),
                    payment_sent_and_pending: false,
                })
                .await;
            match cached {
                Ok(flow) => return Ok(flow),
                Err(e) => debug!(error = %e, "Payment flow state unavailable, reconstructing from ledger"),
            }
        }

        self.reconstructor.reconstruct(payment_hash).await.map_err(|e| {
            error!(error = %e, "Could not reconstruct payment flow");
            e
        })
    }
}
