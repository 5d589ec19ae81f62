//! Demo backends
//!
//! In-memory collaborators seeded with three network payments so a pass has
//! something to do: one settled by the network (flow still cached), one
//! failed (flow rebuilt from the ledger) and one still in flight.

use std::sync::Arc;

use tracing::info;

use ledgerflow_ledger::{InMemoryLedger, PendingPaymentEntry};
use ledgerflow_payments::{
    FixedPriceConverter, InMemoryPaymentFlowState, PaymentFlow, PaymentFlowBuilder, PaymentFlowBuilderConfig,
    PaymentFlowStateRepository, PriceRatio, ProtocolFeeSchedule, WithAmountResultExt, WithDestinationResultExt,
    WithSenderWalletResultExt,
};
use ledgerflow_settlement::InMemorySettlementNetwork;
use ledgerflow_types::{
    generate_secret_and_payment_hash, BtcPaymentAmount, PaymentHash, Pubkey, Result, RevealedPreImage,
    SecretPreImage, UsdPaymentAmount, WalletCurrency, WalletDescriptor,
};
use ledgerflow_wallet::InMemoryWalletRepository;

const DEMO_NODE: &str = "03demosettlementnode";

/// $60,000 per btc
const DEMO_USD_CENTS: u64 = 6_000_000;
const DEMO_SATS: u64 = 100_000_000;
const DEMO_SPREAD_BPS: u64 = 30;

/// Collaborators shared by the demo seed and the reconciler
#[derive(Clone)]
pub struct DemoBackends {
    pub ledger: InMemoryLedger,
    pub network: InMemorySettlementNetwork,
    pub wallets: InMemoryWalletRepository,
    pub flow_state: Arc<InMemoryPaymentFlowState>,
}

impl DemoBackends {
    pub fn new(flow_state: Arc<InMemoryPaymentFlowState>) -> Self {
        Self {
            ledger: InMemoryLedger::new(),
            network: InMemorySettlementNetwork::new(),
            wallets: InMemoryWalletRepository::new(),
            flow_state,
        }
    }
}

struct SentPayment {
    secret: SecretPreImage,
    payment_hash: PaymentHash,
    flow: PaymentFlow,
}

/// Build a lightning payment flow, record it as pending and put it in flight
async fn send(
    backends: &DemoBackends,
    builder: &PaymentFlowBuilder,
    dealer: &FixedPriceConverter,
    sender: &WalletDescriptor,
    amount: f64,
) -> Result<SentPayment> {
    let (secret, payment_hash) = generate_secret_and_payment_hash();
    let flow = builder
        .with_payment_hash(&payment_hash.to_string())
        .with_description("demo payment")
        .with_sender_wallet(sender.clone())
        .with_amount(amount)
        .without_recipient_wallet()?
        .with_conversion(dealer)
        .await?;

    let (amount, fee) = match flow.sender_wallet_currency {
        WalletCurrency::Btc => (flow.btc_payment_amount.amount(), flow.btc_protocol_fee.amount()),
        WalletCurrency::Usd => (flow.usd_payment_amount.amount(), flow.usd_protocol_fee.amount()),
    };
    backends
        .ledger
        .record_pending_payment(PendingPaymentEntry {
            wallet_id: sender.id.clone(),
            currency: sender.currency,
            payment_hash: payment_hash.clone(),
            pubkey: Some(Pubkey::new(DEMO_NODE)),
            amount,
            fee,
            usd: flow.usd_payment_amount.amount(),
            fee_usd: flow.usd_protocol_fee.amount(),
            fee_known_in_advance: false,
        })
        .await?;
    backends
        .network
        .send_payment(Pubkey::new(DEMO_NODE), payment_hash.clone(), flow.btc_payment_amount)
        .await;

    Ok(SentPayment {
        secret,
        payment_hash,
        flow,
    })
}

/// Seed the demo payments
pub async fn seed(backends: &DemoBackends, fees: ProtocolFeeSchedule) -> Result<()> {
    let ratio = PriceRatio::new(UsdPaymentAmount::new(DEMO_USD_CENTS), BtcPaymentAmount::new(DEMO_SATS))?;
    let builder = PaymentFlowBuilder::new(PaymentFlowBuilderConfig::new(
        fees,
        Arc::new(FixedPriceConverter::mid_price(ratio)),
    ));
    let dealer = FixedPriceConverter::with_spread_bps(ratio, DEMO_SPREAD_BPS);

    let usd_wallet = backends.wallets.create(WalletCurrency::Usd);
    let btc_wallet = backends.wallets.create(WalletCurrency::Btc);

    // Settled by the network for a quarter of the reserved fee
    let settled = send(backends, &builder, &dealer, &usd_wallet, 1_000.0).await?;
    backends.flow_state.persist_new(settled.flow.clone()).await?;
    let actual_fee = BtcPaymentAmount::new(settled.flow.btc_protocol_fee.amount() / 4);
    backends
        .network
        .settle(
            &settled.payment_hash,
            actual_fee,
            Some(RevealedPreImage::new(settled.secret.as_str())),
        )
        .await?;

    // Failed; its flow was never cached
    let failed = send(backends, &builder, &dealer, &btc_wallet, 25_000.0).await?;
    backends.network.fail(&failed.payment_hash).await?;

    // Still in flight
    let in_flight = send(backends, &builder, &dealer, &btc_wallet, 10_000.0).await?;

    info!(
        settled = %settled.payment_hash,
        failed = %failed.payment_hash,
        in_flight = %in_flight.payment_hash,
        "Seeded demo payments"
    );
    Ok(())
}
