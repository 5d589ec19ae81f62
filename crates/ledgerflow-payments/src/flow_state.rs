//! Payment flow state cache
//!
//! Flows are stored when a payment is sent so the reconciler can pick them up
//! again without rebuilding them from the ledger. Entries expire; an expired
//! or missing entry is not an error for the caller to fix, it just means the
//! flow has to be reconstructed.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use ledgerflow_types::{LedgerFlowError, PaymentHash, Result, WalletId};

use crate::PaymentFlow;

/// Arguments for updating a cached lightning flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePendingFlowArgs {
    pub sender_wallet_id: WalletId,
    pub payment_hash: PaymentHash,
    pub input_amount: u64,
    pub payment_sent_and_pending: bool,
}

/// Persistence for payment flows between send and confirmation
#[async_trait]
pub trait PaymentFlowStateRepository: Send + Sync {
    /// Store a freshly built flow
    async fn persist_new(&self, flow: PaymentFlow) -> Result<PaymentFlow>;

    async fn find_lightning_payment_flow(
        &self,
        wallet_id: &WalletId,
        payment_hash: &PaymentHash,
        input_amount: u64,
    ) -> Result<PaymentFlow>;

    /// Set the pending flag of a stored flow and return the updated flow
    async fn update_pending_lightning_payment_flow(&self, args: UpdatePendingFlowArgs) -> Result<PaymentFlow>;

    /// Drop expired entries, returning how many were removed
    async fn delete_expired(&self) -> Result<usize>;
}

type FlowKey = (WalletId, PaymentHash);

/// In-memory flow cache with a time-to-live measured from `created_at`
pub struct InMemoryPaymentFlowState {
    flows: DashMap<FlowKey, PaymentFlow>,
    ttl: chrono::Duration,
}

impl InMemoryPaymentFlowState {
    pub fn new(ttl: Duration) -> Self {
        Self {
            flows: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
        }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    fn is_expired(&self, flow: &PaymentFlow) -> bool {
        flow.created_at
            .checked_add_signed(self.ttl)
            .map(|expires_at| expires_at <= Utc::now())
            .unwrap_or(false)
    }

    fn not_found(payment_hash: &PaymentHash) -> LedgerFlowError {
        LedgerFlowError::PaymentFlowStateNotFound {
            payment_hash: payment_hash.to_string(),
        }
    }

    /// Live entry for the key, with the input amount checked
    fn live_entry(&self, key: &FlowKey, input_amount: u64) -> Result<PaymentFlow> {
        let flow = self
            .flows
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Self::not_found(&key.1))?;
        if self.is_expired(&flow) {
            return Err(Self::not_found(&key.1));
        }
        if flow.input_amount != input_amount {
            return Err(LedgerFlowError::PaymentFlowStateMismatch {
                payment_hash: key.1.to_string(),
                reason: format!("input amount {} does not match stored {}", input_amount, flow.input_amount),
            });
        }
        Ok(flow)
    }
}

impl Default for InMemoryPaymentFlowState {
    fn default() -> Self {
        Self::new(Duration::from_secs(86_400))
    }
}

#[async_trait]
impl PaymentFlowStateRepository for InMemoryPaymentFlowState {
    async fn persist_new(&self, flow: PaymentFlow) -> Result<PaymentFlow> {
        let payment_hash = flow
            .payment_hash()
            .cloned()
            .ok_or_else(|| LedgerFlowError::invalid_builder_state("only network payment flows are cached"))?;
        self.flows
            .insert((flow.sender_wallet_id.clone(), payment_hash), flow.clone());
        Ok(flow)
    }

    async fn find_lightning_payment_flow(
        &self,
        wallet_id: &WalletId,
        payment_hash: &PaymentHash,
        input_amount: u64,
    ) -> Result<PaymentFlow> {
        self.live_entry(&(wallet_id.clone(), payment_hash.clone()), input_amount)
    }

    async fn update_pending_lightning_payment_flow(&self, args: UpdatePendingFlowArgs) -> Result<PaymentFlow> {
        let key = (args.sender_wallet_id, args.payment_hash);
        let flow = self.live_entry(&key, args.input_amount)?;
        let updated = flow.with_payment_sent_and_pending(args.payment_sent_and_pending);
        self.flows.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete_expired(&self) -> Result<usize> {
        let before = self.flows.len();
        self.flows.retain(|_, flow| !self.is_expired(flow));
        let removed = before.saturating_sub(self.flows.len());
        if removed > 0 {
            debug!(removed, "Deleted expired payment flows");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Destination, PaymentInitiationMethod, SettlementMethod};
    use ledgerflow_types::{BtcPaymentAmount, UsdPaymentAmount, WalletCurrency};

    fn flow(created_at: chrono::DateTime<Utc>) -> PaymentFlow {
        let (_, payment_hash) = ledgerflow_types::generate_secret_and_payment_hash();
        PaymentFlow {
            sender_wallet_id: WalletId::new(),
            sender_wallet_currency: WalletCurrency::Btc,
            recipient_wallet_id: None,
            recipient_wallet_currency: None,
            recipient_pubkey: None,
            recipient_username: None,
            destination: Destination::PaymentHash(payment_hash),
            description_from_invoice: String::new(),
            input_amount: 1_000,
            btc_payment_amount: BtcPaymentAmount::new(1_000),
            usd_payment_amount: UsdPaymentAmount::new(25),
            btc_protocol_fee: BtcPaymentAmount::new(10),
            usd_protocol_fee: UsdPaymentAmount::new(1),
            settlement_method: SettlementMethod::Lightning,
            payment_initiation_method: PaymentInitiationMethod::Lightning,
            created_at,
            payment_sent_and_pending: false,
        }
    }

    fn update_args(flow: &PaymentFlow, input_amount: u64) -> UpdatePendingFlowArgs {
        UpdatePendingFlowArgs {
            sender_wallet_id: flow.sender_wallet_id.clone(),
            payment_hash: flow.payment_hash().cloned().unwrap(),
            input_amount,
            payment_sent_and_pending: true,
        }
    }

    #[tokio::test]
    async fn test_update_marks_flow_pending() {
        let cache = InMemoryPaymentFlowState::default();
        let stored = cache.persist_new(flow(Utc::now())).await.unwrap();

        let updated = cache
            .update_pending_lightning_payment_flow(update_args(&stored, 1_000))
            .await
            .unwrap();
        assert!(updated.payment_sent_and_pending);

        let found = cache
            .find_lightning_payment_flow(&stored.sender_wallet_id, stored.payment_hash().unwrap(), 1_000)
            .await
            .unwrap();
        assert_eq!(found, updated);
    }

    #[tokio::test]
    async fn test_mismatched_input_amount() {
        let cache = InMemoryPaymentFlowState::default();
        let stored = cache.persist_new(flow(Utc::now())).await.unwrap();
        let result = cache
            .update_pending_lightning_payment_flow(update_args(&stored, 999))
            .await;
        assert!(matches!(result, Err(LedgerFlowError::PaymentFlowStateMismatch { .. })));
    }

    #[tokio::test]
    async fn test_expired_flow_is_not_found() {
        let cache = InMemoryPaymentFlowState::new(Duration::from_secs(60));
        let stale = cache
            .persist_new(flow(Utc::now() - chrono::Duration::minutes(5)))
            .await
            .unwrap();
        let fresh = cache.persist_new(flow(Utc::now())).await.unwrap();

        let result = cache
            .update_pending_lightning_payment_flow(update_args(&stale, 1_000))
            .await;
        assert!(matches!(result, Err(LedgerFlowError::PaymentFlowStateNotFound { .. })));

        assert_eq!(cache.delete_expired().await.unwrap(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache
            .find_lightning_payment_flow(&fresh.sender_wallet_id, fresh.payment_hash().unwrap(), 1_000)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_onchain_flows_are_not_cached() {
        let cache = InMemoryPaymentFlowState::default();
        let mut onchain = flow(Utc::now());
        onchain.destination = Destination::Address(ledgerflow_types::OnChainAddress::new("bc1qexample"));
        assert!(cache.persist_new(onchain).await.is_err());
        assert!(cache.is_empty());
    }
}
