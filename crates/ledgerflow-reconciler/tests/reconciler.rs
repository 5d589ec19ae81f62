use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;

use ledgerflow_ledger::{
    FeeReimbursementEntry, InMemoryLedger, LedgerStore, PendingPaymentEntry, TransactionMetadata,
};
use ledgerflow_lock::{DistributedLock, InMemoryLockService, LockGuard};
use ledgerflow_payments::{
    Destination, InMemoryPaymentFlowState, PaymentFlow, PaymentFlowStateRepository, PaymentInitiationMethod,
    Reimbursement, SettlementMethod,
};
use ledgerflow_reconciler::{
    FeeReimburser, LedgerFeeReimburser, PaymentOutcome, PendingPaymentReconciler, ReconcilerServices,
    ReconcilerSettings, ReimburseFeeArgs,
};
use ledgerflow_settlement::InMemorySettlementNetwork;
use ledgerflow_types::{
    generate_secret_and_payment_hash, BtcPaymentAmount, JournalId, LedgerFlowError, LedgerTransaction,
    LedgerTransactionType, PaymentHash, PendingPayment, Pubkey, Result, RevealedPreImage, UsdPaymentAmount,
    WalletCurrency, WalletDescriptor, WalletId,
};
use ledgerflow_wallet::{InMemoryWalletRepository, WalletRepository};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

const NODE: &str = "03settlementnode";

// ============================================================================
// Test doubles
// ============================================================================

/// Ledger that is slow to answer the idempotency check and counts settlements
struct SlowLedger {
    inner: InMemoryLedger,
    delay: Duration,
    settle_calls: AtomicUsize,
}

#[async_trait]
impl LedgerStore for SlowLedger {
    async fn list_wallet_ids_with_pending_payments(&self) -> Result<Vec<WalletId>> {
        self.inner.list_wallet_ids_with_pending_payments().await
    }

    async fn get_pending_payments_count(&self, wallet_id: &WalletId) -> Result<usize> {
        self.inner.get_pending_payments_count(wallet_id).await
    }

    async fn list_pending_payments(&self, wallet_id: &WalletId) -> Result<Vec<PendingPayment>> {
        self.inner.list_pending_payments(wallet_id).await
    }

    async fn is_finalized(&self, payment_hash: &PaymentHash) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.is_finalized(payment_hash).await
    }

    async fn settle_pending(&self, payment_hash: &PaymentHash) -> Result<()> {
        self.settle_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.settle_pending(payment_hash).await
    }

    async fn revert_payment(&self, journal_id: &JournalId, payment_hash: &PaymentHash) -> Result<()> {
        self.inner.revert_payment(journal_id, payment_hash).await
    }

    async fn get_transactions_by_hash(&self, payment_hash: &PaymentHash) -> Result<Vec<LedgerTransaction>> {
        self.inner.get_transactions_by_hash(payment_hash).await
    }

    async fn update_metadata(&self, payment_hash: &PaymentHash, metadata: TransactionMetadata) -> Result<()> {
        self.inner.update_metadata(payment_hash, metadata).await
    }

    async fn record_fee_reimbursement(&self, entry: FeeReimbursementEntry) -> Result<JournalId> {
        self.inner.record_fee_reimbursement(entry).await
    }
}

/// Ledger whose backend is down
struct UnreachableLedger;

#[async_trait]
impl LedgerStore for UnreachableLedger {
    async fn list_wallet_ids_with_pending_payments(&self) -> Result<Vec<WalletId>> {
        Err(LedgerFlowError::ledger_service("connection refused"))
    }

    async fn get_pending_payments_count(&self, _wallet_id: &WalletId) -> Result<usize> {
        Err(LedgerFlowError::ledger_service("connection refused"))
    }

    async fn list_pending_payments(&self, _wallet_id: &WalletId) -> Result<Vec<PendingPayment>> {
        Err(LedgerFlowError::ledger_service("connection refused"))
    }

    async fn is_finalized(&self, _payment_hash: &PaymentHash) -> Result<bool> {
        Err(LedgerFlowError::ledger_service("connection refused"))
    }

    async fn settle_pending(&self, _payment_hash: &PaymentHash) -> Result<()> {
        Err(LedgerFlowError::ledger_service("connection refused"))
    }

    async fn revert_payment(&self, _journal_id: &JournalId, _payment_hash: &PaymentHash) -> Result<()> {
        Err(LedgerFlowError::ledger_service("connection refused"))
    }

    async fn get_transactions_by_hash(&self, _payment_hash: &PaymentHash) -> Result<Vec<LedgerTransaction>> {
        Err(LedgerFlowError::ledger_service("connection refused"))
    }

    async fn update_metadata(&self, _payment_hash: &PaymentHash, _metadata: TransactionMetadata) -> Result<()> {
        Err(LedgerFlowError::ledger_service("connection refused"))
    }

    async fn record_fee_reimbursement(&self, _entry: FeeReimbursementEntry) -> Result<JournalId> {
        Err(LedgerFlowError::ledger_service("connection refused"))
    }
}

/// Ledger with individually broken write paths
#[derive(Default)]
struct FailingLedger {
    inner: InMemoryLedger,
    fail_settle: bool,
    fail_revert: bool,
    fail_metadata: bool,
}

#[async_trait]
impl LedgerStore for FailingLedger {
    async fn list_wallet_ids_with_pending_payments(&self) -> Result<Vec<WalletId>> {
        self.inner.list_wallet_ids_with_pending_payments().await
    }

    async fn get_pending_payments_count(&self, wallet_id: &WalletId) -> Result<usize> {
        self.inner.get_pending_payments_count(wallet_id).await
    }

    async fn list_pending_payments(&self, wallet_id: &WalletId) -> Result<Vec<PendingPayment>> {
        self.inner.list_pending_payments(wallet_id).await
    }

    async fn is_finalized(&self, payment_hash: &PaymentHash) -> Result<bool> {
        self.inner.is_finalized(payment_hash).await
    }

    async fn settle_pending(&self, payment_hash: &PaymentHash) -> Result<()> {
        if self.fail_settle {
            return Err(LedgerFlowError::ledger_service("write timed out"));
        }
        self.inner.settle_pending(payment_hash).await
    }

    async fn revert_payment(&self, journal_id: &JournalId, payment_hash: &PaymentHash) -> Result<()> {
        if self.fail_revert {
            return Err(LedgerFlowError::LedgerRevertFailed {
                journal_id: journal_id.to_string(),
                payment_hash: payment_hash.to_string(),
                reason: "write timed out".to_string(),
            });
        }
        self.inner.revert_payment(journal_id, payment_hash).await
    }

    async fn get_transactions_by_hash(&self, payment_hash: &PaymentHash) -> Result<Vec<LedgerTransaction>> {
        self.inner.get_transactions_by_hash(payment_hash).await
    }

    async fn update_metadata(&self, payment_hash: &PaymentHash, metadata: TransactionMetadata) -> Result<()> {
        if self.fail_metadata {
            return Err(LedgerFlowError::ledger_service("write timed out"));
        }
        self.inner.update_metadata(payment_hash, metadata).await
    }

    async fn record_fee_reimbursement(&self, entry: FeeReimbursementEntry) -> Result<JournalId> {
        self.inner.record_fee_reimbursement(entry).await
    }
}

/// Lock whose key for one payment hash is held elsewhere for good
struct ContendedLock {
    inner: InMemoryLockService,
    held_key: String,
}

#[async_trait]
impl DistributedLock for ContendedLock {
    async fn acquire(&self, key: &str) -> Result<LockGuard> {
        if key == self.held_key {
            return Err(LedgerFlowError::LockAcquisitionTimeout {
                key: key.to_string(),
                waited_ms: 5_000,
            });
        }
        self.inner.acquire(key).await
    }
}

/// Counts events logged with `fatal = true`
#[derive(Clone, Default)]
struct FatalEvents(Arc<AtomicUsize>);

impl FatalEvents {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

struct FatalFlag(bool);

impl Visit for FatalFlag {
    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "fatal" && value {
            self.0 = true;
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn fmt::Debug) {}
}

impl<S: tracing::Subscriber> Layer<S> for FatalEvents {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut flag = FatalFlag(false);
        event.record(&mut flag);
        if flag.0 {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Reimburser that counts calls before delegating
struct CountingReimburser {
    inner: LedgerFeeReimburser,
    calls: AtomicUsize,
}

#[async_trait]
impl FeeReimburser for CountingReimburser {
    async fn reimburse(&self, args: ReimburseFeeArgs) -> Result<Option<Reimbursement>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.reimburse(args).await
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    ledger: InMemoryLedger,
    network: InMemorySettlementNetwork,
    wallets: InMemoryWalletRepository,
    flow_state: Arc<InMemoryPaymentFlowState>,
    reimburser: Arc<CountingReimburser>,
    reconciler: PendingPaymentReconciler,
}

impl Harness {
    fn new() -> Self {
        let ledger = InMemoryLedger::new();
        Self::with_store(ledger.clone(), Arc::new(ledger))
    }

    fn with_store(ledger: InMemoryLedger, store: Arc<dyn LedgerStore>) -> Self {
        Self::build(ledger, store, None, None)
    }

    /// `lock` and `known_wallets` replace what the reconciler sees; payments
    /// are still recorded against the harness's own wallets
    fn build(
        ledger: InMemoryLedger,
        store: Arc<dyn LedgerStore>,
        lock: Option<Arc<dyn DistributedLock>>,
        known_wallets: Option<Arc<dyn WalletRepository>>,
    ) -> Self {
        let network = InMemorySettlementNetwork::new();
        let wallets = InMemoryWalletRepository::new();
        let flow_state = Arc::new(InMemoryPaymentFlowState::default());
        let reimburser = Arc::new(CountingReimburser {
            inner: LedgerFeeReimburser::new(Arc::clone(&store)),
            calls: AtomicUsize::new(0),
        });
        let settings = ReconcilerSettings {
            workers: 3,
            lock_timeout_secs: 5,
            ..ReconcilerSettings::default()
        };
        let services = ReconcilerServices {
            ledger: store,
            lock: lock.unwrap_or_else(|| Arc::new(InMemoryLockService::new(settings.lock_timeout()))),
            network: Arc::new(network.clone()),
            wallets: known_wallets.unwrap_or_else(|| Arc::new(wallets.clone())),
            flow_state: flow_state.clone(),
            reimburser: reimburser.clone(),
        };
        Self {
            ledger,
            network,
            wallets,
            flow_state,
            reimburser,
            reconciler: PendingPaymentReconciler::new(services, settings),
        }
    }

    fn reimbursements(&self) -> usize {
        self.reimburser.calls.load(Ordering::SeqCst)
    }

    /// Record a btc payment of `amount` sats with `fee` sats reserved and put
    /// it in flight on the network
    async fn send_btc_payment(&self, amount: u64, fee: u64) -> (WalletDescriptor, PaymentHash, JournalId) {
        self.send_payment(WalletCurrency::Btc, amount, fee, amount, false).await
    }

    async fn send_payment(
        &self,
        currency: WalletCurrency,
        amount: u64,
        fee: u64,
        network_sats: u64,
        fee_known_in_advance: bool,
    ) -> (WalletDescriptor, PaymentHash, JournalId) {
        let wallet = self.wallets.create(currency);
        let (_, hash) = generate_secret_and_payment_hash();
        let journal_id = self
            .ledger
            .record_pending_payment(PendingPaymentEntry {
                wallet_id: wallet.id.clone(),
                currency,
                payment_hash: hash.clone(),
                pubkey: Some(Pubkey::new(NODE)),
                amount,
                fee,
                usd: 1_000,
                fee_usd: 10,
                fee_known_in_advance,
            })
            .await
            .unwrap();
        self.network
            .send_payment(Pubkey::new(NODE), hash.clone(), BtcPaymentAmount::new(network_sats))
            .await;
        (wallet, hash, journal_id)
    }

    async fn pending_entry(&self, hash: &PaymentHash) -> PendingPayment {
        self.ledger
            .get_transactions_by_hash(hash)
            .await
            .unwrap()
            .into_iter()
            .find(|tx| tx.wallet_id.is_some())
            .unwrap()
    }
}

fn cached_flow(wallet: &WalletDescriptor, hash: &PaymentHash, amount: u64, btc_fee: u64) -> PaymentFlow {
    PaymentFlow {
        sender_wallet_id: wallet.id.clone(),
        sender_wallet_currency: wallet.currency,
        recipient_wallet_id: None,
        recipient_wallet_currency: None,
        recipient_pubkey: Some(Pubkey::new(NODE)),
        recipient_username: None,
        destination: Destination::PaymentHash(hash.clone()),
        description_from_invoice: "coffee".to_string(),
        input_amount: amount,
        btc_payment_amount: BtcPaymentAmount::new(amount),
        usd_payment_amount: UsdPaymentAmount::new(1_000),
        btc_protocol_fee: BtcPaymentAmount::new(btc_fee),
        usd_protocol_fee: UsdPaymentAmount::new(10),
        settlement_method: SettlementMethod::Lightning,
        payment_initiation_method: PaymentInitiationMethod::Lightning,
        created_at: Utc::now(),
        payment_sent_and_pending: true,
    }
}

// ============================================================================
// Settlement
// ============================================================================

#[tokio::test]
async fn test_settled_payment_refunds_unused_fee() {
    let h = Harness::new();
    let (wallet, hash, _) = h.send_btc_payment(50_000, 500).await;
    let (secret, _) = generate_secret_and_payment_hash();
    h.network
        .settle(&hash, BtcPaymentAmount::new(120), Some(RevealedPreImage::new(secret.as_str())))
        .await
        .unwrap();

    let report = h.reconciler.reconcile_all_pending_payments().await;
    assert_eq!(report.payments_settled, 1);
    assert_eq!(report.fees_reimbursed, 1);
    assert_eq!(report.payments_failed, 0);

    let refunds: Vec<_> = h
        .ledger
        .entries_of_type(LedgerTransactionType::FeeReimbursement)
        .await
        .into_iter()
        .filter(|tx| tx.wallet_id.as_ref() == Some(&wallet.id))
        .collect();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].credit, 380);
    assert_eq!(h.ledger.wallet_balance(&wallet.id).await, -(50_500 - 380));

    let entry = h.pending_entry(&hash).await;
    assert!(!entry.pending_confirmation);
    assert!(entry.revealed_pre_image.is_some());

    // A second pass finds nothing left to do
    let again = h.reconciler.reconcile_all_pending_payments().await;
    assert_eq!(again.wallets_processed, 0);
    assert_eq!(h.reimbursements(), 1);
}

#[tokio::test]
async fn test_fee_known_in_advance_is_not_reimbursed() {
    let h = Harness::new();
    let (wallet, hash, _) = h
        .send_payment(WalletCurrency::Btc, 50_000, 500, 50_000, true)
        .await;
    h.network.settle(&hash, BtcPaymentAmount::new(120), None).await.unwrap();

    let entry = h.pending_entry(&hash).await;
    let outcome = h.reconciler.reconcile_pending_payment(&entry).await.unwrap();
    assert_eq!(outcome, PaymentOutcome::Settled { reimbursed: None });
    assert_eq!(h.reimbursements(), 0);
    assert_eq!(h.ledger.wallet_balance(&wallet.id).await, -50_500);
}

#[tokio::test]
async fn test_cached_flow_is_preferred_over_ledger() {
    let h = Harness::new();
    let (wallet, hash, _) = h.send_btc_payment(50_000, 500).await;
    // The cached flow reserved less than the ledger entry shows
    h.flow_state
        .persist_new(cached_flow(&wallet, &hash, 50_000, 300))
        .await
        .unwrap();
    h.network.settle(&hash, BtcPaymentAmount::new(120), None).await.unwrap();

    let entry = h.pending_entry(&hash).await;
    let outcome = h.reconciler.reconcile_pending_payment(&entry).await.unwrap();
    let PaymentOutcome::Settled { reimbursed: Some(refund) } = outcome else {
        panic!("expected a refund, got {:?}", outcome);
    };
    assert_eq!(refund.btc.amount(), 180);

    let cached = h
        .flow_state
        .find_lightning_payment_flow(&wallet.id, &hash, 50_000)
        .await
        .unwrap();
    assert!(!cached.payment_sent_and_pending);
}

#[tokio::test]
async fn test_usd_payment_reconstructed_from_ledger_and_network() {
    let h = Harness::new();
    // 1,000 cents bought 50,000 sats; 10 cents of fee reserved
    let (wallet, hash, _) = h
        .send_payment(WalletCurrency::Usd, 1_000, 10, 50_000, false)
        .await;
    h.network.settle(&hash, BtcPaymentAmount::new(120), None).await.unwrap();

    let entry = h.pending_entry(&hash).await;
    let outcome = h.reconciler.reconcile_pending_payment(&entry).await.unwrap();
    let PaymentOutcome::Settled { reimbursed: Some(refund) } = outcome else {
        panic!("expected a refund, got {:?}", outcome);
    };
    // 500 sats reserved, 120 used: 380 sats is 7.6 cents, refunded as 7
    assert_eq!(refund.btc.amount(), 380);
    assert_eq!(refund.usd.amount(), 7);
    assert_eq!(h.ledger.wallet_balance(&wallet.id).await, -(1_010 - 7));
}

// ============================================================================
// Failure and reversion
// ============================================================================

#[tokio::test]
async fn test_failed_payment_is_reverted() {
    let h = Harness::new();
    let (wallet, hash, journal_id) = h.send_btc_payment(50_000, 500).await;
    h.network.fail(&hash).await.unwrap();

    let report = h.reconciler.reconcile_all_pending_payments().await;
    assert_eq!(report.payments_reverted, 1);
    assert_eq!(report.payments_settled, 0);

    let reversals = h.ledger.entries_of_type(LedgerTransactionType::Reversal).await;
    assert_eq!(reversals.len(), 2);
    assert!(reversals.iter().all(|tx| tx.reversal_of.as_ref() == Some(&journal_id)));
    assert_eq!(h.ledger.wallet_balance(&wallet.id).await, 0);
    assert_eq!(h.reimbursements(), 0);
}

#[tokio::test]
async fn test_failed_usd_payment_without_cache_cannot_be_reconstructed() {
    let h = Harness::new();
    let (_, hash, _) = h
        .send_payment(WalletCurrency::Usd, 1_000, 10, 50_000, false)
        .await;
    h.network.fail(&hash).await.unwrap();

    let entry = h.pending_entry(&hash).await;
    let result = h.reconciler.reconcile_pending_payment(&entry).await;
    assert!(matches!(result, Err(LedgerFlowError::UnknownLightningService { .. })));
    assert!(h.pending_entry(&hash).await.pending_confirmation);
}

#[tokio::test]
async fn test_revert_failure_is_fatal_and_not_reimbursed() {
    let ledger = InMemoryLedger::new();
    let store = Arc::new(FailingLedger {
        inner: ledger.clone(),
        fail_revert: true,
        ..FailingLedger::default()
    });
    let h = Harness::with_store(ledger, store);
    let (wallet, hash, journal_id) = h.send_btc_payment(50_000, 500).await;
    h.network.fail(&hash).await.unwrap();

    let fatal = FatalEvents::default();
    let _subscriber = tracing::subscriber::set_default(tracing_subscriber::registry().with(fatal.clone()));

    let entry = h.pending_entry(&hash).await;
    let result = h.reconciler.reconcile_pending_payment(&entry).await;
    match result {
        Err(LedgerFlowError::LedgerRevertFailed { journal_id: failed, .. }) => {
            assert_eq!(failed, journal_id.to_string())
        }
        other => panic!("expected a revert failure, got {:?}", other),
    }
    assert_eq!(fatal.count(), 1);
    assert_eq!(h.reimbursements(), 0);
    assert!(h.ledger.entries_of_type(LedgerTransactionType::Reversal).await.is_empty());
    assert_eq!(h.ledger.wallet_balance(&wallet.id).await, -50_500);
}

// ============================================================================
// Ledger and collaborator failures
// ============================================================================

#[tokio::test]
async fn test_settle_failure_leaves_payment_pending() {
    let ledger = InMemoryLedger::new();
    let store = Arc::new(FailingLedger {
        inner: ledger.clone(),
        fail_settle: true,
        ..FailingLedger::default()
    });
    let h = Harness::with_store(ledger, store);
    let (wallet, hash, _) = h.send_btc_payment(50_000, 500).await;
    h.network.settle(&hash, BtcPaymentAmount::new(120), None).await.unwrap();

    let entry = h.pending_entry(&hash).await;
    let result = h.reconciler.reconcile_pending_payment(&entry).await;
    assert!(matches!(result, Err(LedgerFlowError::LedgerService { .. })));
    assert!(h.pending_entry(&hash).await.pending_confirmation);
    assert_eq!(h.reimbursements(), 0);
    assert_eq!(h.ledger.wallet_balance(&wallet.id).await, -50_500);
}

#[tokio::test]
async fn test_unknown_sender_wallet_stops_before_reimbursement() {
    let ledger = InMemoryLedger::new();
    let h = Harness::build(
        ledger.clone(),
        Arc::new(ledger),
        None,
        Some(Arc::new(InMemoryWalletRepository::new())),
    );
    let (_, hash, _) = h.send_btc_payment(50_000, 500).await;
    h.network.settle(&hash, BtcPaymentAmount::new(120), None).await.unwrap();

    let entry = h.pending_entry(&hash).await;
    let result = h.reconciler.reconcile_pending_payment(&entry).await;
    assert!(matches!(result, Err(LedgerFlowError::WalletNotFound { .. })));
    assert_eq!(h.reimbursements(), 0);
    // The wallet lookup comes after the ledger entries are settled
    assert!(!h.pending_entry(&hash).await.pending_confirmation);
}

#[tokio::test]
async fn test_metadata_failure_does_not_block_settlement() {
    let ledger = InMemoryLedger::new();
    let store = Arc::new(FailingLedger {
        inner: ledger.clone(),
        fail_metadata: true,
        ..FailingLedger::default()
    });
    let h = Harness::with_store(ledger, store);
    let (wallet, hash, _) = h.send_btc_payment(50_000, 500).await;
    let (secret, _) = generate_secret_and_payment_hash();
    h.network
        .settle(&hash, BtcPaymentAmount::new(120), Some(RevealedPreImage::new(secret.as_str())))
        .await
        .unwrap();

    let entry = h.pending_entry(&hash).await;
    let outcome = h.reconciler.reconcile_pending_payment(&entry).await.unwrap();
    let PaymentOutcome::Settled { reimbursed: Some(refund) } = outcome else {
        panic!("expected a refund, got {:?}", outcome);
    };
    assert_eq!(refund.btc.amount(), 380);
    assert_eq!(h.reimbursements(), 1);

    let settled = h.pending_entry(&hash).await;
    assert!(!settled.pending_confirmation);
    assert!(settled.revealed_pre_image.is_none());
    assert_eq!(h.ledger.wallet_balance(&wallet.id).await, -(50_500 - 380));
}

#[tokio::test]
async fn test_lock_timeout_fails_only_that_payment() {
    let ledger = InMemoryLedger::new();
    let (_, contended_hash) = generate_secret_and_payment_hash();
    let lock = Arc::new(ContendedLock {
        inner: InMemoryLockService::new(Duration::from_secs(5)),
        held_key: contended_hash.lock_key(),
    });
    let h = Harness::build(ledger.clone(), Arc::new(ledger), Some(lock), None);

    // Two payments from one wallet; only the second has a contended lock key
    let (wallet, hash, _) = h.send_btc_payment(50_000, 500).await;
    h.network.settle(&hash, BtcPaymentAmount::new(120), None).await.unwrap();

    let mut contended = h.pending_entry(&hash).await;
    contended.id = ledgerflow_types::LedgerTransactionId::new();
    contended.journal_id = JournalId::new();
    contended.payment_hash = Some(contended_hash.clone());
    h.ledger.append_raw(contended).await;
    h.network
        .send_payment(Pubkey::new(NODE), contended_hash.clone(), BtcPaymentAmount::new(50_000))
        .await;
    h.network
        .settle(&contended_hash, BtcPaymentAmount::new(120), None)
        .await
        .unwrap();

    let results = h
        .reconciler
        .reconcile_pending_payments_for_wallet(&wallet.id)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(LedgerFlowError::LockAcquisitionTimeout { .. }))));
    assert!(results
        .iter()
        .any(|r| matches!(r, Ok(PaymentOutcome::Settled { reimbursed: Some(_) }))));

    assert!(!h.pending_entry(&hash).await.pending_confirmation);
    assert!(h.pending_entry(&contended_hash).await.pending_confirmation);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_runs_finalize_once() {
    let ledger = InMemoryLedger::new();
    let slow = Arc::new(SlowLedger {
        inner: ledger.clone(),
        delay: Duration::from_millis(20),
        settle_calls: AtomicUsize::new(0),
    });
    let h = Harness::with_store(ledger, slow.clone());
    let (_, hash, _) = h.send_btc_payment(50_000, 500).await;
    h.network.settle(&hash, BtcPaymentAmount::new(120), None).await.unwrap();

    let entry = h.pending_entry(&hash).await;
    let runs = (0..5).map(|_| h.reconciler.reconcile_pending_payment(&entry));
    let outcomes: Vec<_> = join_all(runs).await.into_iter().map(|r| r.unwrap()).collect();

    let settled = outcomes
        .iter()
        .filter(|o| matches!(o, PaymentOutcome::Settled { .. }))
        .count();
    let already = outcomes
        .iter()
        .filter(|o| **o == PaymentOutcome::AlreadyProcessed)
        .count();
    assert_eq!(settled, 1);
    assert_eq!(already, 4);
    assert_eq!(slow.settle_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.reimbursements(), 1);
}

// ============================================================================
// Error isolation
// ============================================================================

#[tokio::test]
async fn test_missing_pubkey_does_not_block_siblings() {
    let h = Harness::new();
    let (wallet, hash, _) = h.send_btc_payment(50_000, 500).await;
    h.network.settle(&hash, BtcPaymentAmount::new(500), None).await.unwrap();

    let mut broken = h.pending_entry(&hash).await;
    let (_, broken_hash) = generate_secret_and_payment_hash();
    broken.id = ledgerflow_types::LedgerTransactionId::new();
    broken.journal_id = JournalId::new();
    broken.payment_hash = Some(broken_hash);
    broken.pubkey = None;
    h.ledger.append_raw(broken).await;

    let results = h
        .reconciler
        .reconcile_pending_payments_for_wallet(&wallet.id)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(e) if e.is_data_integrity())));
    assert!(results
        .iter()
        .any(|r| matches!(r, Ok(PaymentOutcome::Settled { reimbursed: None }))));
}

#[tokio::test]
async fn test_network_outage_leaves_payment_pending() {
    let h = Harness::new();
    let (_, hash, _) = h.send_btc_payment(50_000, 500).await;
    h.network.set_offline(true);

    let report = h.reconciler.reconcile_all_pending_payments().await;
    assert_eq!(report.payments_failed, 1);
    assert!(h.pending_entry(&hash).await.pending_confirmation);

    h.network.set_offline(false);
    h.network.settle(&hash, BtcPaymentAmount::new(120), None).await.unwrap();
    let report = h.reconciler.reconcile_all_pending_payments().await;
    assert_eq!(report.payments_settled, 1);
    assert!(!h.pending_entry(&hash).await.pending_confirmation);
}

#[tokio::test]
async fn test_in_flight_payment_is_left_alone() {
    let h = Harness::new();
    let (_, hash, _) = h.send_btc_payment(50_000, 500).await;

    let report = h.reconciler.reconcile_all_pending_payments().await;
    assert_eq!(report.payments_still_pending, 1);
    assert!(h.pending_entry(&hash).await.pending_confirmation);
}

#[tokio::test]
async fn test_unreachable_ledger_aborts_pass() {
    let h = Harness::with_store(InMemoryLedger::new(), Arc::new(UnreachableLedger));
    let report = h.reconciler.reconcile_all_pending_payments().await;
    assert!(report.aborted);
    assert_eq!(report.wallets_processed, 0);
}

#[tokio::test]
async fn test_many_wallets_across_workers() {
    let h = Harness::new();
    let mut hashes = Vec::new();
    for _ in 0..8 {
        let (_, hash, _) = h.send_btc_payment(10_000, 100).await;
        h.network.settle(&hash, BtcPaymentAmount::new(40), None).await.unwrap();
        hashes.push(hash);
    }

    let report = h.reconciler.reconcile_all_pending_payments().await;
    assert_eq!(report.wallets_processed, 8);
    assert_eq!(report.payments_settled, 8);
    assert_eq!(report.fees_reimbursed, 8);
    for hash in &hashes {
        assert!(!h.pending_entry(hash).await.pending_confirmation);
    }
}
