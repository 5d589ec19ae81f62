//! LedgerFlow Settlement - Settlement network gateway
//!
//! The settlement network is the authority on whether a payment settled or
//! failed. The ledger only mirrors what the network reports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

pub use ledgerflow_types::{ConfirmedDetails, LookupPaymentArgs, PaymentLookup, PaymentStatus};

use ledgerflow_types::{
    BtcPaymentAmount, LedgerFlowError, PaymentHash, Pubkey, Result, RevealedPreImage,
};

/// Gateway to the settlement network
#[async_trait]
pub trait SettlementNetwork: Send + Sync {
    async fn lookup_payment(&self, args: LookupPaymentArgs) -> Result<PaymentLookup>;
}

/// A payment as the in-memory network tracks it
#[derive(Debug, Clone)]
pub struct NetworkPayment {
    pub pubkey: Pubkey,
    pub payment_hash: PaymentHash,
    pub amount: BtcPaymentAmount,
    pub status: PaymentStatus,
    pub fee: BtcPaymentAmount,
    pub revealed_pre_image: Option<RevealedPreImage>,
    pub sent_at: DateTime<Utc>,
}

impl NetworkPayment {
    fn lookup(&self) -> PaymentLookup {
        let confirmed_details = match self.status {
            PaymentStatus::Settled => Some(ConfirmedDetails {
                rounded_up_fee: self.fee,
                revealed_pre_image: self.revealed_pre_image.clone(),
            }),
            PaymentStatus::Failed | PaymentStatus::Pending => None,
        };
        PaymentLookup {
            payment_hash: self.payment_hash.clone(),
            status: self.status,
            rounded_up_amount: self.amount,
            confirmed_details,
        }
    }
}

/// Settlement network simulated in memory
///
/// Payments are registered with [`send_payment`](Self::send_payment) and moved
/// to a terminal state with [`settle`](Self::settle) or [`fail`](Self::fail).
/// Clones share the same payments.
#[derive(Clone, Default)]
pub struct InMemorySettlementNetwork {
    payments: Arc<RwLock<HashMap<PaymentHash, NetworkPayment>>>,
    lookups: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
}

impl InMemorySettlementNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an outgoing payment as in flight
    pub async fn send_payment(&self, pubkey: Pubkey, payment_hash: PaymentHash, amount: BtcPaymentAmount) {
        let payment = NetworkPayment {
            pubkey,
            payment_hash: payment_hash.clone(),
            amount,
            status: PaymentStatus::Pending,
            fee: BtcPaymentAmount::zero(),
            revealed_pre_image: None,
            sent_at: Utc::now(),
        };
        self.payments.write().await.insert(payment_hash, payment);
    }

    /// Mark a payment settled with the fee actually paid
    pub async fn settle(
        &self,
        payment_hash: &PaymentHash,
        fee: BtcPaymentAmount,
        revealed_pre_image: Option<RevealedPreImage>,
    ) -> Result<()> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(payment_hash)
            .ok_or_else(|| LedgerFlowError::PaymentNotFound {
                payment_hash: payment_hash.to_string(),
            })?;
        payment.status = PaymentStatus::Settled;
        payment.fee = fee;
        payment.revealed_pre_image = revealed_pre_image;
        info!(payment_hash = %payment_hash, fee = %fee, "Network payment settled");
        Ok(())
    }

    /// Mark a payment failed
    pub async fn fail(&self, payment_hash: &PaymentHash) -> Result<()> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(payment_hash)
            .ok_or_else(|| LedgerFlowError::PaymentNotFound {
                payment_hash: payment_hash.to_string(),
            })?;
        payment.status = PaymentStatus::Failed;
        warn!(payment_hash = %payment_hash, "Network payment failed");
        Ok(())
    }

    /// Make every lookup fail as if the node were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of lookups served or refused so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettlementNetwork for InMemorySettlementNetwork {
    async fn lookup_payment(&self, args: LookupPaymentArgs) -> Result<PaymentLookup> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerFlowError::PaymentLookupFailed {
                payment_hash: args.payment_hash.to_string(),
                message: "settlement node unreachable".to_string(),
            });
        }

        let payments = self.payments.read().await;
        let payment = payments
            .get(&args.payment_hash)
            .filter(|payment| args.pubkey.as_ref().map_or(true, |pubkey| &payment.pubkey == pubkey))
            .ok_or_else(|| LedgerFlowError::PaymentNotFound {
                payment_hash: args.payment_hash.to_string(),
            })?;
        Ok(payment.lookup())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerflow_types::generate_secret_and_payment_hash;

    fn args(pubkey: Option<&str>, payment_hash: &PaymentHash) -> LookupPaymentArgs {
        LookupPaymentArgs {
            pubkey: pubkey.map(Pubkey::new),
            payment_hash: payment_hash.clone(),
        }
    }

    #[tokio::test]
    async fn test_payment_lifecycle() {
        let network = InMemorySettlementNetwork::new();
        let (secret, hash) = generate_secret_and_payment_hash();
        network
            .send_payment(Pubkey::new("03node"), hash.clone(), BtcPaymentAmount::new(50_000))
            .await;

        let pending = network.lookup_payment(args(Some("03node"), &hash)).await.unwrap();
        assert_eq!(pending.status, PaymentStatus::Pending);
        assert!(pending.rounded_up_fee().is_zero());

        let preimage = RevealedPreImage::new(secret.as_str());
        network
            .settle(&hash, BtcPaymentAmount::new(120), Some(preimage.clone()))
            .await
            .unwrap();
        let settled = network.lookup_payment(args(None, &hash)).await.unwrap();
        assert_eq!(settled.status, PaymentStatus::Settled);
        assert_eq!(settled.rounded_up_fee().amount(), 120);
        assert_eq!(settled.revealed_pre_image(), Some(&preimage));
        assert!(hash.matches_preimage(&preimage));
        assert_eq!(network.lookup_count(), 2);
    }

    #[tokio::test]
    async fn test_lookup_on_wrong_node() {
        let network = InMemorySettlementNetwork::new();
        let (_, hash) = generate_secret_and_payment_hash();
        network
            .send_payment(Pubkey::new("03node"), hash.clone(), BtcPaymentAmount::new(1_000))
            .await;
        let result = network.lookup_payment(args(Some("02other"), &hash)).await;
        assert!(matches!(result, Err(LedgerFlowError::PaymentNotFound { .. })));
    }

    #[tokio::test]
    async fn test_offline_network_is_transient() {
        let network = InMemorySettlementNetwork::new();
        let (_, hash) = generate_secret_and_payment_hash();
        network.set_offline(true);
        let err = network.lookup_payment(args(None, &hash)).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_failed_payment_has_no_details() {
        let network = InMemorySettlementNetwork::new();
        let (_, hash) = generate_secret_and_payment_hash();
        network
            .send_payment(Pubkey::new("03node"), hash.clone(), BtcPaymentAmount::new(1_000))
            .await;
        network.fail(&hash).await.unwrap();
        let failed = network.lookup_payment(args(None, &hash)).await.unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert!(failed.confirmed_details.is_none());
    }
}
