//! LedgerFlow Wallet - Wallet lookup
//!
//! Payment logic only needs a wallet's id and currency. Account details,
//! limits and ownership live elsewhere.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use ledgerflow_types::{LedgerFlowError, Result, WalletCurrency, WalletDescriptor, WalletId};

/// Read access to wallets
#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn find_by_id(&self, wallet_id: &WalletId) -> Result<WalletDescriptor>;
}

/// Wallets held in memory. Clones share the same wallets.
#[derive(Clone, Default)]
pub struct InMemoryWalletRepository {
    wallets: Arc<DashMap<WalletId, WalletDescriptor>>,
}

impl InMemoryWalletRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a wallet in the given currency
    pub fn create(&self, currency: WalletCurrency) -> WalletDescriptor {
        let wallet = WalletDescriptor::new(WalletId::new(), currency);
        self.insert(wallet.clone());
        wallet
    }

    pub fn insert(&self, wallet: WalletDescriptor) {
        self.wallets.insert(wallet.id.clone(), wallet);
    }

    pub fn remove(&self, wallet_id: &WalletId) -> Option<WalletDescriptor> {
        self.wallets.remove(wallet_id).map(|(_, wallet)| wallet)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

#[async_trait]
impl WalletRepository for InMemoryWalletRepository {
    async fn find_by_id(&self, wallet_id: &WalletId) -> Result<WalletDescriptor> {
        self.wallets
            .get(wallet_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LedgerFlowError::WalletNotFound {
                wallet_id: wallet_id.to_string(),
            })
    }
}
