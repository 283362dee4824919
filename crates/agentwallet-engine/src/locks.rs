//! Per-wallet admission locks
//!
//! The admission path must be serialized per wallet: two concurrent
//! admissions may otherwise both observe balance >= amount and both debit.
//! Locks are keyed by wallet id and created on first use; the registry map
//! itself is only held long enough to fetch or insert an entry.

use agentwallet_types::WalletId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct WalletLocks {
    locks: Mutex<HashMap<WalletId, Arc<tokio::sync::Mutex<()>>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the lock for a wallet, creating it if needed
    pub fn for_wallet(&self, wallet: WalletId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(wallet)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_wallet_same_lock() {
        let locks = WalletLocks::new();
        let id = WalletId::new();
        let a = locks.for_wallet(id);
        let b = locks.for_wallet(id);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &locks.for_wallet(WalletId::new())));
    }

    #[tokio::test]
    async fn test_serializes_critical_section() {
        let locks = Arc::new(WalletLocks::new());
        let id = WalletId::new();
        let counter = Arc::new(parking_lot::Mutex::new(0u32));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let lock = locks.for_wallet(id);
                let _guard = lock.lock().await;
                let before = *counter.lock();
                tokio::task::yield_now().await;
                *counter.lock() = before + 1;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*counter.lock(), 8);
    }
}
